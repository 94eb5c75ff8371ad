/// Heap-resident string payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Str(String);

impl Str {
    #[must_use]
    pub fn new(s: String) -> Self {
        Self(s)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Number of chars, which is the length seen by scripts.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Char at a char (not byte) index.
    #[must_use]
    pub fn char_at(&self, index: usize) -> Option<char> {
        self.0.chars().nth(index)
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
