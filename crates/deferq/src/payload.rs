//! Durable payload wire format

use serde::{Deserialize, Serialize};

use crate::options::{BackendOptions, SubmissionOptions};
use crate::task::{Args, Kwargs};

/// What the durable backend stores and later delivers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl Payload {
    pub fn new(path: impl Into<String>, args: Args, kwargs: Kwargs) -> Self {
        Self {
            path: path.into(),
            args,
            kwargs,
        }
    }

    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(body: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Build the durable payload and the backend options stored alongside it.
///
/// `kwargs` must already be free of submission options.
pub fn prepare(
    path: impl Into<String>,
    args: Args,
    kwargs: Kwargs,
    options: &SubmissionOptions,
) -> (Payload, BackendOptions) {
    (Payload::new(path, args, kwargs), options.to_backend_options())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_normal() {
        let kwargs: Kwargs =
            serde_json::from_value(json!({"some": "thing", "other": "thing", "3": 5})).unwrap();
        let args = vec![json!(1), json!(2), json!("a"), json!("c")];

        let (payload, options) = prepare(
            "/some/path",
            args.clone(),
            kwargs.clone(),
            &SubmissionOptions::default(),
        );
        assert!(options.is_empty());
        assert_eq!(payload, Payload::new("/some/path", args, kwargs));
    }

    #[test]
    fn test_prepare_with_split_options() {
        let kwargs: Kwargs = serde_json::from_value(json!({
            "a": 1,
            "_queue": "q2",
            "_custom": "x",
        }))
        .unwrap();
        let (kwargs, submission) = SubmissionOptions::split(kwargs).unwrap();

        let (payload, options) = prepare("m.f", vec![], kwargs, &submission);
        assert_eq!(payload.kwargs, serde_json::from_value::<Kwargs>(json!({"a": 1})).unwrap());
        assert_eq!(options.queue_name(), Some("q2"));
        assert_eq!(options.get("_custom"), Some(&json!("x")));
        assert!(options.get("_queue").is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let payload = Payload::from_bytes(br#"{"args": [1]}"#).unwrap();
        assert!(payload.path.is_empty());
        assert_eq!(payload.args, vec![json!(1)]);
        assert!(payload.kwargs.is_empty());

        assert!(Payload::from_bytes(b"not json").is_err());
    }
}
