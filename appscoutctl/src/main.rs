use clap::Parser;

fn main() {
    let cli = appscoutctl::Cli::parse();
    if let Err(err) = appscoutctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
