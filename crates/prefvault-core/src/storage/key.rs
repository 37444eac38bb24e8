use std::{fmt, marker::PhantomData};

use super::{StorageValue, ValueKind};

/// Name of a stored value plus its kind, carried in the type parameter.
///
/// ```
/// use prefvault_core::storage::{TypedKey, ValueKind};
///
/// let key = TypedKey::<i32>::new("calendar/first_weekday");
/// assert_eq!(key.kind(), ValueKind::Int32);
/// ```
pub struct TypedKey<T> {
    name: String,
    _value: PhantomData<fn() -> T>,
}

impl<T: StorageValue> TypedKey<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        T::KIND
    }

    /// Same name, different kind. Used by stores that persist a value under
    /// another representation (e.g. encrypted bytes).
    pub fn retyped<U: StorageValue>(&self) -> TypedKey<U> {
        TypedKey::new(self.name.clone())
    }
}

impl<T> Clone for TypedKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _value: PhantomData,
        }
    }
}

impl<T: StorageValue> fmt::Debug for TypedKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedKey")
            .field("name", &self.name)
            .field("kind", &T::KIND)
            .finish()
    }
}

impl<T> PartialEq for TypedKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for TypedKey<T> {}
