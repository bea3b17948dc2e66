use sc_store::StoreError;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("The language model is not available right now ({0})")]
    ModelUnavailable(String),
    #[error("Language model error: {0:#}")]
    Model(#[from] anyhow::Error),
    #[error("Could not understand the model's reply for the {0}")]
    MalformedResponse(&'static str),
    #[error("Could not save the recipe: {0}")]
    Persistence(#[from] StoreError),
    #[error("Recipe {0} was not found")]
    NotFound(String),
    #[error("{0} needs {1} first")]
    MissingPrerequisite(&'static str, &'static str),
    #[error("This recipe is for {identified}, not {requested}")]
    DishMismatch { requested: String, identified: String },
    #[error("There is no step {0} in this recipe")]
    NoSuchStep(usize),
    #[error("Invalid photo: {0:#}")]
    InvalidPhoto(anyhow::Error),
}

impl SessionError {
    /// Short title for the notice shown to the user.
    pub fn title(&self) -> &'static str {
        match self {
            SessionError::ModelUnavailable(_) | SessionError::Model(_) => "Model unavailable",
            SessionError::MalformedResponse(_) => "Unexpected answer",
            SessionError::Persistence(_) => "Could not save",
            SessionError::NotFound(_) => "Recipe not found",
            SessionError::MissingPrerequisite(..) | SessionError::NoSuchStep(_) => {
                "Not possible yet"
            }
            SessionError::DishMismatch { .. } => "Different dish",
            SessionError::InvalidPhoto(_) => "Invalid photo",
        }
    }
}
