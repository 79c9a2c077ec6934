use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + Display pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Channel {
    Telegram => "telegram",
    Max => "max",
});

str_enum!(CatalogKind {
    Doctor => "doctor",
    Service => "service",
    Aspect => "aspect",
    Source => "source",
    Reward => "reward",
    Platform => "platform",
    Reason => "reason",
});

impl CatalogKind {
    /// Human-readable label used in API error messages ("Doctor not found!").
    pub fn label(&self) -> &'static str {
        match self {
            Self::Doctor => "Doctor",
            Self::Service => "Service",
            Self::Aspect => "Aspect",
            Self::Source => "Source",
            Self::Reward => "Reward",
            Self::Platform => "Platform",
            Self::Reason => "Reason",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_displays_as_str() {
        assert_eq!(Channel::Max.as_str(), "max");
        assert_eq!(Channel::Max.to_string(), "max");
    }

    #[test]
    fn catalog_kind_serializes_snake_case() {
        let json = serde_json::to_string(&CatalogKind::Platform).unwrap();
        assert_eq!(json, "\"platform\"");
        assert_eq!(CatalogKind::Reward.label(), "Reward");
    }
}
