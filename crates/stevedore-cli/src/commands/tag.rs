use super::EXIT_SUCCESS;
use stevedore_daemon::Daemon;

pub fn run(daemon: &Daemon, source: &str, target: &str) -> Result<u8, String> {
    let bound = daemon
        .tag(source, target, None)
        .map_err(|e| e.to_string())?;
    println!("{bound}");
    Ok(EXIT_SUCCESS)
}
