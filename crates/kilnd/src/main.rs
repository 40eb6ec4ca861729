use std::process::ExitCode;

fn main() -> ExitCode {
    match kilnd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("kilnd: {error}");
            ExitCode::FAILURE
        }
    }
}
