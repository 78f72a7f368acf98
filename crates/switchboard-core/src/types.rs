//! Runtime type tokens.
//!
//! Handler descriptors record the types of their declared parameters and
//! return value as [`TypeToken`]s. The signature validator compares tokens,
//! so equality is by [`TypeId`] only; the name is carried for diagnostics.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a `'static` Rust type, plus its readable name.
#[derive(Clone, Copy)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
}

impl TypeToken {
    /// Returns the token for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The token for `()`, the only accepted handler return type.
    pub fn unit() -> Self {
        Self::of::<()>()
    }

    /// Returns the underlying [`TypeId`].
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the last path segment of the type name, generics included.
    ///
    /// `alloc::string::String` becomes `String`, and
    /// `switchboard_core::envelope::Request<alloc::string::String>` becomes
    /// `Request<alloc::string::String>`.
    pub fn short_name(&self) -> &'static str {
        let head = self.name.split('<').next().unwrap_or(self.name);
        match head.rfind("::") {
            Some(idx) => &self.name[idx + 2..],
            None => self.name,
        }
    }

    /// Returns `true` if this token identifies `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeToken {}

impl Hash for TypeToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_type() {
        assert_eq!(TypeToken::of::<String>(), TypeToken::of::<String>());
        assert_ne!(TypeToken::of::<String>(), TypeToken::of::<&'static str>());
        assert!(TypeToken::unit().is::<()>());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(TypeToken::of::<String>().short_name(), "String");
        assert_eq!(TypeToken::of::<u32>().short_name(), "u32");
        assert!(
            TypeToken::of::<Vec<String>>()
                .short_name()
                .starts_with("Vec<")
        );
    }
}
