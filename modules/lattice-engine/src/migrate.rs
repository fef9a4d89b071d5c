use lattice_graph::{query, GraphClient};
use tracing::info;

/// Run idempotent schema migrations: the handle-key uniqueness constraint
/// that backs identity resolution, and a lookup index on the volatile
/// external id.
pub async fn migrate(client: &GraphClient) -> Result<(), neo4rs::Error> {
    let g = client.inner();

    info!("Running schema migrations...");

    let statements = [
        "CREATE CONSTRAINT entity_handle_key IF NOT EXISTS \
         FOR (e:Entity) REQUIRE e.handle_key IS UNIQUE",
        "CREATE INDEX entity_external_id IF NOT EXISTS \
         FOR (e:Entity) ON (e.entity_id)",
        "CREATE INDEX entity_classification IF NOT EXISTS \
         FOR (e:Entity) ON (e.classification)",
    ];

    for s in &statements {
        g.run(query(s)).await?;
    }

    info!("Schema migrations complete");
    Ok(())
}
