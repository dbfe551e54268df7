/// Error type returned by the audio output
#[derive(Debug)]
pub struct OutputError {
    msg: String
}

impl OutputError {
    pub fn new(msg: &str) -> Self {
        let msg = msg.to_string();
        OutputError { msg }
    }
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for OutputError {}

pub type OutputResult<T> = Result<T, OutputError>;
