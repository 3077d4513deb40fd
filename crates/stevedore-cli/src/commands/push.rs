use super::EXIT_SUCCESS;
use stevedore_daemon::Daemon;
use stevedore_remote::RegistryCredentials;

pub fn run(
    daemon: &Daemon,
    reference: &str,
    token: Option<&str>,
) -> Result<u8, String> {
    let creds = match token {
        Some(token) => RegistryCredentials::bearer(token),
        None => RegistryCredentials::anonymous(),
    };
    let mut stdout = std::io::stdout();
    daemon
        .push(reference, &creds, &mut stdout)
        .map_err(|e| e.to_string())?;
    Ok(EXIT_SUCCESS)
}
