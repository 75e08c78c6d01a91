use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps personal data (customer phone numbers) so it never shows up in `Debug` or `Display` output.
///
/// Serialization still emits the real value: the owning customer and the assigned driver need it
/// in their booking payloads. The mask only guards against `tracing::info!("{:?}", booking)`.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_masked() {
        let phone = Masked("+91 98765 43210".to_string());
        assert_eq!(format!("{:?}", phone), "********");
        assert_eq!(format!("{}", phone), "********");
    }

    #[test]
    fn test_serializes_real_value() {
        let phone = Masked("555-0100".to_string());
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"555-0100\"");

        let back: Masked<String> = serde_json::from_str("\"555-0100\"").unwrap();
        assert_eq!(back.expose(), "555-0100");
    }
}
