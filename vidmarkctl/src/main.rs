use clap::Parser;

fn main() {
    let cli = vidmarkctl::Cli::parse();
    vidmarkctl::init_tracing(cli.verbose);
    if let Err(err) = vidmarkctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
