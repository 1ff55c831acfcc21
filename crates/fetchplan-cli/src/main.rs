use std::process::ExitCode;

fn main() -> ExitCode {
    let matches = fetchplan_cli::command().get_matches();
    let stdout = std::io::stdout();
    match fetchplan_cli::run(&matches, &mut stdout.lock()) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
