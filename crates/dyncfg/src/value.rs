//! Coercion of stored configuration strings into typed values.

/// A type a configuration string can be coerced into.
pub trait FromConfigValue: Sized {
    /// Type name used in type-mismatch errors.
    const TYPE_NAME: &'static str;

    /// Coerce a raw stored string into this type. `None` means the value
    /// cannot represent the type; the caller decides whether that is a hard
    /// error or a fall-back to a default.
    fn from_config_value(raw: &str) -> Option<Self>;

    /// Whether the coerced value is too empty to be meaningful. Only strings
    /// override this: a blank stored string falls through to the caller's
    /// default in the default-returning accessor.
    fn is_blank(&self) -> bool {
        false
    }
}

impl FromConfigValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_config_value(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl FromConfigValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_config_value(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

macro_rules! impl_from_config_value_parse {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromConfigValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn from_config_value(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }
            }
        )*
    };
}

impl_from_config_value_parse! {
    i32 => "i32",
    i64 => "i64",
    f64 => "f64",
}
