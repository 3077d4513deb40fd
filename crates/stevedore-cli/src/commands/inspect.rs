use super::{format_created, json_pretty, EXIT_SUCCESS};
use stevedore_daemon::Daemon;

pub fn run(daemon: &Daemon, reference: &str, json: bool) -> Result<u8, String> {
    let details = daemon.inspect(reference).map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&details)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("id:              {}", details.id);
    println!(
        "references:      {}",
        if details.repo_tags.is_empty() && details.repo_digests.is_empty() {
            "(none)".to_owned()
        } else {
            details
                .repo_tags
                .iter()
                .chain(details.repo_digests.iter())
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!("created:         {}", format_created(details.created));
    println!(
        "engine_version:  {}",
        details.engine_version.as_deref().unwrap_or("(none)")
    );
    if !details.labels.is_empty() {
        println!("labels:");
        for (key, value) in &details.labels {
            println!("  {key}={value}");
        }
    }
    println!("services:");
    for service in &details.services {
        println!("  {} ({} -> {})", service.name, service.image, service.image_id);
        if !service.command.is_empty() {
            println!("    command: {}", service.command.join(" "));
        }
        if !service.args.is_empty() {
            println!("    args:    {}", service.args.join(" "));
        }
        for env in &service.env {
            println!("    env:     {env}");
        }
    }
    Ok(EXIT_SUCCESS)
}
