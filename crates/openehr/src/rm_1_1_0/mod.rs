//! openEHR Reference Model (RM) 1.1.0 wire support.
//!
//! Canonical JSON for RM objects carries a `_type` discriminator on every object. Each wire
//! struct here owns a zero-sized class tag field serialized as `_type`, and every polymorphic
//! position is a closed enum whose variant is chosen from that discriminator on read.

/// Declares a zero-sized class tag serialized as the RM class name.
///
/// Tags accept any incoming `_type` string: the owning enum (if any) already dispatched on it,
/// and monomorphic positions tolerate subclass names written by other systems.
macro_rules! rm_class_tag {
    ($($name:ident => $class:literal),+ $(,)?) => {
        $(
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
            pub struct $name;

            impl $name {
                pub const CLASS: &'static str = $class;
            }

            impl serde::Serialize for $name {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    serializer.serialize_str($class)
                }
            }

            impl<'de> serde::Deserialize<'de> for $name {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    let _ = <String as serde::Deserialize>::deserialize(deserializer)?;
                    Ok($name)
                }
            }
        )+
    };
}

/// Implements `Deserialize` for a closed RM enum by dispatching on `_type`.
///
/// `default` names the class assumed when the discriminator is missing.
macro_rules! rm_dispatch {
    ($enum:ident, default: $default:expr, { $($class:literal => $variant:ident($ty:ty)),+ $(,)? }) => {
        impl<'de> serde::Deserialize<'de> for $enum {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                use serde::de::Error as _;

                let value = <serde_json::Value as serde::Deserialize>::deserialize(deserializer)?;
                let default: Option<&str> = $default;
                let class = match value.get("_type").and_then(serde_json::Value::as_str) {
                    Some(class) => class.to_owned(),
                    None => match default {
                        Some(class) => class.to_owned(),
                        None => {
                            return Err(D::Error::custom(concat!(
                                "missing _type discriminator for ",
                                stringify!($enum)
                            )))
                        }
                    },
                };
                match class.as_str() {
                    $(
                        $class => serde_json::from_value::<$ty>(value)
                            .map($enum::$variant)
                            .map_err(D::Error::custom),
                    )+
                    other => Err(D::Error::custom(format!(
                        "unsupported _type '{}' for {}",
                        other,
                        stringify!($enum)
                    ))),
                }
            }
        }
    };
}

pub mod composition;
pub mod constants;
pub mod content;
pub mod data_values;
pub mod structure;
pub mod support;
pub mod tag;
