use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = restsync_cli::Cli::parse();
    match restsync_cli::run(cli) {
        Ok(report) => {
            for path in &report.saved {
                println!("{path}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(restsync_cli::exit_code(&err))
        }
    }
}
