use std::fmt;
use std::str::FromStr;

use super::error::GraphError;

/// Remote methods this client knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    FriendsGet,
    UsersGet,
}

impl ApiMethod {
    pub const ALL: [ApiMethod; 2] = [ApiMethod::FriendsGet, ApiMethod::UsersGet];

    pub fn name(&self) -> &'static str {
        match self {
            ApiMethod::FriendsGet => "friends.get",
            ApiMethod::UsersGet => "users.get",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ApiMethod {
    type Err = GraphError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ApiMethod::ALL
            .into_iter()
            .find(|method| method.name() == value)
            .ok_or_else(|| GraphError::Unexpected(format!("unknown api method {value:?}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    method: ApiMethod,
    params: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: ApiMethod) -> Self {
        Self {
            method,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn method(&self) -> ApiMethod {
        self.method
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_parse_back() {
        for method in ApiMethod::ALL {
            assert_eq!(method.name().parse::<ApiMethod>().unwrap(), method);
        }
        assert!("wall.post".parse::<ApiMethod>().is_err());
    }

    #[test]
    fn builder_keeps_params_in_order() {
        let request = ApiRequest::new(ApiMethod::FriendsGet)
            .param("user_id", 42)
            .param("fields", "nickname");
        assert_eq!(request.method(), ApiMethod::FriendsGet);
        assert_eq!(
            request.params(),
            &[
                ("user_id".to_string(), "42".to_string()),
                ("fields".to_string(), "nickname".to_string()),
            ]
        );
    }
}
