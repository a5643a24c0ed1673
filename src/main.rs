#![forbid(unsafe_code)]

//! hddled: disk-activity LED daemon entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = match cli_app::Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(cli_app::parse_exit_code(&e));
        }
    };
    if let Err(e) = cli_app::run(&args) {
        eprintln!("hddled: {e}");
        std::process::exit(e.exit_code());
    }
}
