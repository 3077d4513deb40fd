use super::{json_pretty, EXIT_SUCCESS};
use std::path::Path;
use stevedore_daemon::{BundleSource, Daemon};

pub fn run(
    daemon: &Daemon,
    file: Option<&Path>,
    url: Option<&str>,
    reference: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let mut out: Box<dyn std::io::Write> = if json {
        Box::new(std::io::sink())
    } else {
        Box::new(std::io::stdout())
    };

    let id = match (file, url) {
        (Some(path), None) => {
            let mut file = std::fs::File::open(path)
                .map_err(|e| format!("failed to read manifest {}: {e}", path.display()))?;
            daemon.create_bundle(BundleSource::Stream(&mut file), reference, None, &mut out)
        }
        (None, Some(url)) => {
            daemon.create_bundle(BundleSource::Url(url), reference, None, &mut out)
        }
        (None, None) => {
            let mut stdin = std::io::stdin().lock();
            daemon.create_bundle(BundleSource::Stream(&mut stdin), reference, None, &mut out)
        }
        (Some(_), Some(_)) => {
            return Err("pass either --file or --url, not both".to_owned());
        }
    }
    .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&serde_json::json!({ "id": id }))?);
    }
    Ok(EXIT_SUCCESS)
}
