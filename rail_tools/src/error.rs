use thiserror::Error;

#[derive(Debug, Error)]
pub enum RailApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the payment rail: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The payment rail returned an empty response")]
    EmptyResponse,
}

impl RailApiError {
    /// True when the rail answered and refused the request, as opposed to the request never completing.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::QueryError { status, .. } if (400..500).contains(status))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::QueryError { status: 404, .. })
    }
}
