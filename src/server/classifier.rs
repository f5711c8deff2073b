use crate::config::ServerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Ready,
    Error,
    Ignore,
}

/// Decides what a line of server output means for a start attempt.
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> LineClass;
}

impl<F> LineClassifier for F
where
    F: Fn(&str) -> LineClass + Send + Sync,
{
    fn classify(&self, line: &str) -> LineClass {
        self(line)
    }
}

/// Substring matching on configurable signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureClassifier {
    ready: String,
    error: String,
    tolerated: Vec<String>,
}

impl SignatureClassifier {
    pub fn new(ready: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ready: ready.into(),
            error: error.into(),
            tolerated: vec![],
        }
    }

    /// Error lines containing any of `tolerated` are ignored
    pub fn with_tolerated(mut self, tolerated: Vec<String>) -> Self {
        self.tolerated = tolerated;
        self
    }
}

impl From<&ServerConfig> for SignatureClassifier {
    fn from(config: &ServerConfig) -> Self {
        Self::new(&config.ready_signature, &config.error_signature)
            .with_tolerated(config.tolerated_errors.clone())
    }
}

impl LineClassifier for SignatureClassifier {
    fn classify(&self, line: &str) -> LineClass {
        if line.contains(&self.ready) {
            return LineClass::Ready;
        }
        if line.contains(&self.error)
            && !self
                .tolerated
                .iter()
                .any(|tolerated| line.contains(tolerated.as_str()))
        {
            return LineClass::Error;
        }
        LineClass::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Installing mods...", LineClass::Ignore)]
    #[case("Started", LineClass::Ready)]
    #[case("[main] Started server on port 21025", LineClass::Ready)]
    #[case("Error: listen EADDRINUSE :::21025", LineClass::Error)]
    #[case("[steamworks] Error: Steam is not running", LineClass::Ignore)]
    #[case("", LineClass::Ignore)]
    fn test_signature_classifier(#[case] line: &str, #[case] expected: LineClass) {
        let classifier = SignatureClassifier::new("Started", "Error")
            .with_tolerated(vec!["[steamworks]".into()]);
        assert_eq!(classifier.classify(line), expected);
    }

    #[test]
    fn test_closure_classifier() {
        let classifier = |line: &str| {
            if line == "up" {
                LineClass::Ready
            } else {
                LineClass::Ignore
            }
        };
        assert_eq!(classifier.classify("up"), LineClass::Ready);
        assert_eq!(classifier.classify("Started"), LineClass::Ignore);
    }
}
