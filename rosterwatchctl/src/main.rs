use clap::Parser;

fn main() {
    let cli = rosterwatchctl::Cli::parse();
    rosterwatchctl::init_tracing(cli.log_level.as_deref());
    if let Err(err) = rosterwatchctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
