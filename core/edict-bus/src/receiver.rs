//! Receivers: comparable, invocable handles to the code a publication is delivered to
//!
//! A [`Receiver`] is what gets registered against a topic matcher. Two receivers
//! compare equal when they refer to the same code (and, for bound methods, the
//! same target object), which is how the broadcaster deduplicates and removes
//! subscriptions. There is no separate subscription token.
//!
//! Bound methods hold a [`Weak`] reference to their target, so a subscription
//! never keeps its object alive. Once the target is dropped, invoking the
//! receiver fails with [`BroadcastError::StaleReceiver`] instead of touching
//! freed memory.

use crate::error::{BroadcastError, Result};
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

type Call = Arc<dyn Fn(&str) + Send + Sync>;
type BoundCall = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Stable identity of a receiver, used for equality and hashing
///
/// Functions and methods are identified by the type of their fn item, which
/// is unique per item even when the compiler folds identical bodies into one
/// address. Objects are identified by allocation address; it cannot be
/// reused while a receiver still holds its weak reference, because the
/// allocation outlives every `Weak` pointing at it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReceiverKey {
    Free { function: TypeId },
    Bound { object: usize, method: TypeId },
    Keyed(Arc<str>),
}

/// Plain function
#[derive(Clone)]
pub struct FreeFunction {
    id: TypeId,
    name: &'static str,
    call: Call,
}

/// Method bound to a weakly-held target object
#[derive(Clone)]
pub struct BoundMethod {
    target: Weak<dyn Any + Send + Sync>,
    method: TypeId,
    name: &'static str,
    call: BoundCall,
}

impl BoundMethod {
    fn object(&self) -> usize {
        self.target.as_ptr() as *const () as usize
    }
}

/// Closure registered under a caller-chosen key
#[derive(Clone)]
pub struct KeyedHandler {
    key: Arc<str>,
    call: Call,
}

/// Type-erased receiver of published payloads
#[derive(Clone)]
pub enum Receiver {
    /// Plain function; identity is the fn item
    Free(FreeFunction),
    /// Method bound to an object; identity is (object address, fn item)
    Bound(BoundMethod),
    /// Arbitrary closure; identity is the supplied key
    Keyed(KeyedHandler),
}

impl Receiver {
    /// Wrap a free function
    ///
    /// `function` must be a fn item (`hello`, `module::handler`) or a
    /// non-capturing closure. Function pointers and capturing closures are
    /// rejected at compile time because their type does not identify them;
    /// use [`Receiver::keyed`] for those.
    pub fn free<F>(function: F) -> Self
    where
        F: Fn(&str) + Copy + Send + Sync + 'static,
    {
        const { assert!(std::mem::size_of::<F>() == 0, "free receivers must be fn items") };

        Receiver::Free(FreeFunction {
            id: TypeId::of::<F>(),
            name: type_name::<F>(),
            call: Arc::new(function),
        })
    }

    /// Bind `method` to the object behind `object`
    ///
    /// Only a weak reference is kept; the subscription does not extend the
    /// object's lifetime. The same fn item rules as [`Receiver::free`] apply
    /// to `method`.
    pub fn bound<T, M>(object: &Arc<T>, method: M) -> Self
    where
        T: Send + Sync + 'static,
        M: Fn(&T, &str) + Copy + Send + Sync + 'static,
    {
        Self::bind(Arc::downgrade(object), method)
    }

    /// Bind `method` to the object a weak handle points at
    ///
    /// Fails with [`BroadcastError::InvalidReceiver`] if the handle is already
    /// dangling (including `Weak::new()`).
    pub fn bound_weak<T, M>(object: &Weak<T>, method: M) -> Result<Self>
    where
        T: Send + Sync + 'static,
        M: Fn(&T, &str) + Copy + Send + Sync + 'static,
    {
        if object.strong_count() == 0 {
            return Err(BroadcastError::InvalidReceiver);
        }
        Ok(Self::bind(object.clone(), method))
    }

    /// Wrap a closure under an explicit identity key
    ///
    /// Closures have no comparable identity of their own, so receivers built
    /// with the same key are considered equal.
    pub fn keyed<K, F>(key: K, handler: F) -> Self
    where
        K: Into<Arc<str>>,
        F: Fn(&str) + Send + Sync + 'static,
    {
        Receiver::Keyed(KeyedHandler {
            key: key.into(),
            call: Arc::new(handler),
        })
    }

    fn bind<T, M>(target: Weak<T>, method: M) -> Self
    where
        T: Send + Sync + 'static,
        M: Fn(&T, &str) + Copy + Send + Sync + 'static,
    {
        const { assert!(std::mem::size_of::<M>() == 0, "bound receivers must use fn items") };

        let erased: Weak<dyn Any + Send + Sync> = target.clone();
        let call = move |payload: &str| match target.upgrade() {
            Some(object) => {
                method(&*object, payload);
                true
            }
            None => false,
        };

        Receiver::Bound(BoundMethod {
            target: erased,
            method: TypeId::of::<M>(),
            name: type_name::<M>(),
            call: Arc::new(call),
        })
    }

    /// Deliver `payload`
    ///
    /// Panics raised by the wrapped code propagate to the caller.
    pub fn invoke(&self, payload: &str) -> Result<()> {
        match self {
            Receiver::Free(free) => (free.call)(payload),
            Receiver::Bound(bound) => {
                if !(bound.call)(payload) {
                    return Err(BroadcastError::StaleReceiver(self.key()));
                }
            }
            Receiver::Keyed(keyed) => (keyed.call)(payload),
        }
        Ok(())
    }

    /// Identity used for equality
    pub fn key(&self) -> ReceiverKey {
        match self {
            Receiver::Free(free) => ReceiverKey::Free { function: free.id },
            Receiver::Bound(bound) => ReceiverKey::Bound {
                object: bound.object(),
                method: bound.method,
            },
            Receiver::Keyed(keyed) => ReceiverKey::Keyed(keyed.key.clone()),
        }
    }

    /// False once a bound receiver's target has been dropped
    pub fn is_alive(&self) -> bool {
        match self {
            Receiver::Bound(bound) => bound.target.strong_count() > 0,
            Receiver::Free(_) | Receiver::Keyed(_) => true,
        }
    }
}

impl PartialEq for Receiver {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Receiver {}

impl Hash for Receiver {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Receiver::Free(free) => write!(f, "Receiver::Free({})", free.name),
            Receiver::Bound(bound) => {
                write!(f, "Receiver::Bound({:#x}, {})", bound.object(), bound.name)
            }
            Receiver::Keyed(keyed) => write!(f, "Receiver::Keyed({:?})", keyed.key),
        }
    }
}
