//! Metric handles and log events emitted by the probe closer.
//!
//! Handles are registered once, when a closer is built, so emitting on the hot
//! path does not look anything up or allocate.

/// Declares a struct of pre-registered metric handles with an `emit` method.
///
/// The arguments in parentheses are passed to `register` and may be used by the
/// handle initializers, typically as label values.
macro_rules! registered_event {
    (
        $event:ident($( $arg:ident: $arg_ty:ty ),* $(,)?) => {
            $( $field:ident: $type:ty = $value:expr, )*
        }

        fn emit(&$slf:ident, $data_name:ident: $data:ty) $emit_body:block
    ) => {
        #[derive(Clone)]
        pub struct $event {
            $( $field: $type, )*
        }

        impl $event {
            pub fn register($( $arg: $arg_ty ),*) -> Self {
                Self {
                    $( $field: $value, )*
                }
            }

            pub fn emit(&$slf, $data_name: $data) $emit_body
        }
    };
}

mod probe_closer;

pub use probe_closer::*;
