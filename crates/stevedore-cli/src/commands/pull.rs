use super::EXIT_SUCCESS;
use stevedore_daemon::Daemon;
use stevedore_remote::RegistryCredentials;

pub fn run(daemon: &Daemon, reference: &str) -> Result<u8, String> {
    daemon
        .pull(reference, &RegistryCredentials::anonymous())
        .map_err(|e| e.to_string())?;
    Ok(EXIT_SUCCESS)
}
