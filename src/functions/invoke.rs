//! Typed handlers behind one uniform call signature, and their invocation.

use super::descriptor::FunctionDescriptor;
use super::marshal::{ArgumentMarshaller, Arguments};
use super::registry::RegisteredFunction;
use crate::{BoxError, Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Uniform shape every host function is stored behind.
pub type Handler = Arc<dyn Fn(&Arguments) -> Result<Value> + Send + Sync>;

/// Plain closures and functions usable as tool handlers.
///
/// Implemented for `Fn(A, B, ..) -> Result<R, E>` with up to six parameters, where
/// each parameter is deserializable, `R` is serializable and `E` converts into a
/// boxed error. `Args` is the parameter tuple and only disambiguates the impls.
pub trait Callable<Args>: Send + Sync + 'static {
    const ARITY: usize;

    fn call(&self, args: &Arguments) -> Result<Value>;
}

macro_rules! impl_callable {
    ($arity:expr; $($ty:ident => $idx:tt),*) => {
        impl<F, R, E, $($ty,)*> Callable<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> std::result::Result<R, E> + Send + Sync + 'static,
            R: Serialize,
            E: Into<BoxError>,
            $($ty: DeserializeOwned,)*
        {
            const ARITY: usize = $arity;

            fn call(&self, args: &Arguments) -> Result<Value> {
                let out = (self)($(args.get::<$ty>($idx)?),*).map_err(|e| {
                    Error::FunctionInvocation {
                        function: args.function().to_string(),
                        arguments: args.raw().clone(),
                        source: e.into(),
                    }
                })?;
                Ok(serde_json::to_value(out)?)
            }
        }
    };
}

impl_callable!(0;);
impl_callable!(1; A => 0);
impl_callable!(2; A => 0, B => 1);
impl_callable!(3; A => 0, B => 1, C => 2);
impl_callable!(4; A => 0, B => 1, C => 2, D => 3);
impl_callable!(5; A => 0, B => 1, C => 2, D => 3, G => 4);
impl_callable!(6; A => 0, B => 1, C => 2, D => 3, G => 4, H => 5);

/// A host function ready for registration: its descriptor plus a typed handler.
#[derive(Clone)]
pub struct ToolFunction {
    descriptor: FunctionDescriptor,
    handler: Handler,
}

impl ToolFunction {
    /// Wrap `handler`, whose parameter count must match the descriptor.
    pub fn new<Args, F>(descriptor: FunctionDescriptor, handler: F) -> Result<Self>
    where
        Args: 'static,
        F: Callable<Args>,
    {
        if <F as Callable<Args>>::ARITY != descriptor.parameters.len() {
            return Err(Error::schema(format!(
                "function '{}' declares {} parameters but its handler takes {}",
                descriptor.name,
                descriptor.parameters.len(),
                <F as Callable<Args>>::ARITY
            )));
        }
        Ok(Self {
            descriptor,
            handler: Arc::new(move |args: &Arguments| {
                <F as Callable<Args>>::call(&handler, args)
            }),
        })
    }

    /// Handler working on the marshalled arguments directly.
    pub fn from_handler(descriptor: FunctionDescriptor, handler: Handler) -> Self {
        Self {
            descriptor,
            handler,
        }
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    pub fn call(&self, args: &Arguments) -> Result<Value> {
        (self.handler)(args)
    }
}

impl fmt::Debug for ToolFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolFunction")
            .field("name", &self.descriptor.name)
            .field("parameters", &self.descriptor.parameters.len())
            .finish()
    }
}

pub struct Invoker;

impl Invoker {
    /// Marshal `arguments`, run the function and return its result as JSON text.
    pub fn invoke(function: &RegisteredFunction, arguments: &Value) -> Result<String> {
        let descriptor = function.function.descriptor();
        let start = Instant::now();

        let args = ArgumentMarshaller::marshal(
            &function.name,
            arguments,
            &descriptor.parameters,
            &function.args_map,
        )?;
        debug!(function = function.name.as_str(), "invoking function");

        let result = function.function.call(&args)?;
        let text = serde_json::to_string(&result)?;

        info!(
            function = function.name.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            result_bytes = text.len(),
            "function invoked"
        );
        Ok(text)
    }
}
