use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use stevedore_cluster::Cluster;

pub fn run(
    cluster: &Cluster,
    bundle: &str,
    stack_name: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let pb = spinner("deploying stack…");
    let deployment = cluster.deploy(stack_name, bundle).map_err(|e| {
        spin_fail(&pb, "deployment failed");
        e.to_string()
    })?;
    spin_ok(
        &pb,
        &format!(
            "deployed stack '{}' ({} services)",
            deployment.name,
            deployment.service_ids.len()
        ),
    );

    if json {
        println!(
            "{}",
            json_pretty(&serde_json::json!({
                "stack": deployment.name,
                "service_ids": deployment.service_ids,
            }))?
        );
    } else {
        for id in &deployment.service_ids {
            println!("service: {id}");
        }
    }
    Ok(EXIT_SUCCESS)
}
