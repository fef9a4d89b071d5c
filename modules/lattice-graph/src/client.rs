use neo4rs::{ConfigBuilder, Graph};

/// Entity rows are small and reads are point lookups or bounded UNWIND
/// batches, so a modest fetch size covers the largest result sets (follow
/// target lists) in one pull.
const FETCH_SIZE: usize = 200;

/// Sized for the directory lookup fan-out plus concurrent classification
/// writes hitting the store at the same time.
const MAX_CONNECTIONS: usize = 16;

/// Bolt connection handle shared by every store instance. Cloning is cheap;
/// the underlying driver pools connections.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(FETCH_SIZE)
            .max_connections(MAX_CONNECTIONS)
            .build()?;
        let graph = Graph::connect(config).await?;
        Ok(Self { graph })
    }

    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}
