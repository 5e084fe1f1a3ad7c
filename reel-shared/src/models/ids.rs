use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl From<String> for $name {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }
        )+
    };
}

opaque_id!(
    /// Server id of a screening
    ShowtimeId,
    /// Server id of a physical seat within an auditorium
    SeatId,
    /// Server id of a time-boxed seat reservation
    HoldId,
    BookingId,
    PaymentId,
    SnackId,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = SeatId::from("A1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"A1\"");

        let parsed: HoldId = serde_json::from_str("\"h-1\"").unwrap();
        assert_eq!(parsed.as_str(), "h-1");
        assert_eq!(parsed.to_string(), "h-1");
    }
}
