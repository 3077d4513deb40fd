use super::{format_created, json_pretty, EXIT_SUCCESS};
use console::style;
use stevedore_daemon::{Daemon, Filters};

pub fn run(
    daemon: &Daemon,
    name: Option<&str>,
    filter_terms: &[String],
    quiet: bool,
    json: bool,
) -> Result<u8, String> {
    let filters = Filters::parse(filter_terms).map_err(|e| e.to_string())?;
    let rows = daemon
        .list(&filters, name.unwrap_or(""))
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&rows)?);
        return Ok(EXIT_SUCCESS);
    }
    if quiet {
        for row in &rows {
            println!("{}", row.id);
        }
        return Ok(EXIT_SUCCESS);
    }
    if rows.is_empty() {
        println!("no bundles found");
        return Ok(EXIT_SUCCESS);
    }

    println!("{:<14} {:<30} {:<20} SERVICES", "BUNDLE_ID", "REFERENCES", "CREATED");
    for row in &rows {
        let references = if row.repo_tags.is_empty() && row.repo_digests.is_empty() {
            "<none>".to_owned()
        } else {
            let mut all = row.repo_tags.clone();
            all.extend(row.repo_digests.iter().map(|d| {
                // Digest references get shortened for the table.
                d.split_once('@').map_or_else(
                    || d.clone(),
                    |(name, digest)| format!("{name}@{}", &digest[..12.min(digest.len())]),
                )
            }));
            all.join(", ")
        };
        println!(
            "{:<14} {:<30} {:<20} {}",
            style(row.id.short()).dim(),
            references,
            format_created(row.created),
            row.services,
        );
    }
    Ok(EXIT_SUCCESS)
}
