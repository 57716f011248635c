#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("no prior snapshot for {host}:{port}")]
    NoPriorSnapshot { host: String, port: u16 },
    #[error("malformed icon payload: {0}")]
    MalformedIcon(String),
    #[error("unknown validity value {0:?}")]
    UnknownValidity(String),
    #[error("unknown table {0:?}")]
    UnknownTable(String),
}
