use super::{EXIT_FAILURE, EXIT_SUCCESS};
use stevedore_daemon::Daemon;

pub fn run(daemon: &Daemon, references: &[String]) -> Result<u8, String> {
    let mut failed = false;
    for reference in references {
        match daemon.delete_bundle(reference) {
            Ok((id, untagged)) => {
                for r in untagged {
                    println!("untagged: {r}");
                }
                println!("deleted: {id}");
            }
            Err(e) => {
                eprintln!("error: {e}");
                failed = true;
            }
        }
    }
    Ok(if failed { EXIT_FAILURE } else { EXIT_SUCCESS })
}
