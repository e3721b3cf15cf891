//! Data types - the callable payload shapes flowing through a pipeline
//!
//! A pipeline carries values of a single callable shape `T`. The
//! [`DataType`] describes that shape: how to build a no-op instance, how
//! to combine N instances into one broadcasting instance, and how to build
//! the lock-guarded forwarder handed out by entry points.
//!
//! Shapes are declared with [`data_type!`]; [`Consumer`], [`BiConsumer`]
//! and [`TriConsumer`] cover the common arities.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use contracts::{PipelineError, Result};

use crate::pipeline::Forward;

/// Hook run before a value is passed downstream
pub type InvocationHook = Arc<dyn Fn() + Send + Sync>;

/// Runtime identity of a payload shape
#[derive(Clone)]
pub struct DataShape {
    name: String,
    type_id: TypeId,
}

impl DataShape {
    /// Shape of the concrete payload type `T`
    pub fn of<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for DataShape {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for DataShape {}

impl fmt::Debug for DataShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for DataShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Describes the payload shape carried by one pipeline
///
/// # Contract
/// - `empty()` returns the same no-op instance every time and never mutates
/// - `wrap_all` invokes every element in slice order; zero elements yields
///   `empty()`, one element yields that element unchanged
pub trait DataType: Send + Sync + Sized + 'static {
    /// The callable value flowing through the chain
    type Data: Clone + Send + Sync + 'static;

    /// Runtime identity used for compatibility checks
    fn shape(&self) -> DataShape;

    /// Stable no-op instance
    fn empty(&self) -> Self::Data;

    /// Whether `data` is the no-op instance
    fn is_empty(&self, data: &Self::Data) -> bool;

    /// Fan-out wrap: one value invoking every element in order
    fn wrap_all(&self, items: &[Self::Data]) -> Self::Data;

    /// Run `hook`, then invoke `downstream` with the same arguments
    fn intercept(&self, downstream: Self::Data, hook: InvocationHook) -> Self::Data;

    /// Value that resolves its target through a lock-guarded lookup on
    /// every invocation
    fn forward(&self, forward: Forward<Self>) -> Self::Data;

    /// Whether a value of `shape` may be inserted into this pipeline
    fn is_compatible_with(&self, shape: &DataShape) -> bool {
        self.shape() == *shape
    }

    /// Self check run when a pipeline is created
    ///
    /// # Errors
    /// `MalformedDataType` when the shape does not describe `Self::Data`,
    /// or when `empty()` / an empty wrap is not recognised as the no-op.
    fn validate(&self) -> Result<()> {
        let shape = self.shape();
        let malformed = |message: &str| PipelineError::malformed_data_type(shape.name(), message);

        if shape != DataShape::of::<Self::Data>(shape.name()) {
            return Err(malformed("shape does not describe the carried value type"));
        }
        if !self.is_empty(&self.empty()) {
            return Err(malformed("empty() is not recognised by is_empty()"));
        }
        if !self.is_empty(&self.wrap_all(&[])) {
            return Err(malformed("wrapping zero values does not yield empty()"));
        }
        Ok(())
    }
}

/// Declare a callable payload shape and its [`DataType`]
///
/// ```ignore
/// engine::data_type! {
///     /// Receives a line and its number
///     pub struct LineSink(line: String, number: usize);
/// }
/// ```
///
/// Every argument type must be `Clone + Send + Sync + 'static`; fan-out
/// hands each target its own clone.
#[macro_export]
macro_rules! data_type {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident $(< $($gen:ident),+ >)? ( $($arg:ident : $ty:ty),+ $(,)? );
    ) => {
        $(#[$meta])*
        $vis struct $name $(< $($gen),+ >)? {
            empty: ::std::sync::Arc<dyn Fn($($ty),+) + Send + Sync>,
            _marker: ::std::marker::PhantomData<fn($($ty),+)>,
        }

        impl $(< $($gen),+ >)? $name $(< $($gen),+ >)?
        where
            $($ty: Clone + Send + Sync + 'static),+
        {
            pub fn new() -> Self {
                Self {
                    empty: ::std::sync::Arc::new(|$(_: $ty),+| {}),
                    _marker: ::std::marker::PhantomData,
                }
            }
        }

        impl $(< $($gen),+ >)? ::std::default::Default for $name $(< $($gen),+ >)?
        where
            $($ty: Clone + Send + Sync + 'static),+
        {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $(< $($gen),+ >)? $crate::DataType for $name $(< $($gen),+ >)?
        where
            $($ty: Clone + Send + Sync + 'static),+
        {
            type Data = ::std::sync::Arc<dyn Fn($($ty),+) + Send + Sync>;

            fn shape(&self) -> $crate::DataShape {
                let args = [$(::std::any::type_name::<$ty>()),+].join(", ");
                $crate::DataShape::of::<Self::Data>(format!("{}({})", stringify!($name), args))
            }

            fn empty(&self) -> Self::Data {
                ::std::sync::Arc::clone(&self.empty)
            }

            fn is_empty(&self, data: &Self::Data) -> bool {
                ::std::sync::Arc::ptr_eq(data, &self.empty)
            }

            fn wrap_all(&self, items: &[Self::Data]) -> Self::Data {
                let mut live: Vec<Self::Data> = items
                    .iter()
                    .filter(|item| !self.is_empty(item))
                    .cloned()
                    .collect();
                match live.len() {
                    0 => self.empty(),
                    1 => live.remove(0),
                    _ => ::std::sync::Arc::new(move |$($arg: $ty),+| {
                        for target in live.iter() {
                            target($($arg.clone()),+);
                        }
                    }),
                }
            }

            fn intercept(&self, downstream: Self::Data, hook: $crate::InvocationHook) -> Self::Data {
                ::std::sync::Arc::new(move |$($arg: $ty),+| {
                    hook();
                    downstream($($arg),+);
                })
            }

            fn forward(&self, forward: $crate::Forward<Self>) -> Self::Data {
                ::std::sync::Arc::new(move |$($arg: $ty),+| {
                    let _ = forward.with(|target| target($($arg),+));
                })
            }
        }
    };
}

data_type! {
    /// Single-argument consumer shape
    pub struct Consumer<A>(a: A);
}

data_type! {
    /// Two-argument consumer shape
    pub struct BiConsumer<A, B>(a: A, b: B);
}

data_type! {
    /// Three-argument consumer shape
    pub struct TriConsumer<A, B, C>(a: A, b: B, c: C);
}
