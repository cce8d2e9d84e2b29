//! Declarative macros for subplugin development.

/// Export the entry points the loader looks for.
///
/// Generates `subplug_abi_version` and `subplug_init`. The body runs while
/// the loader is opening the library and must register every name the
/// subplugin provides before it returns. The body must evaluate to `()`.
///
/// # Example
///
/// ```rust,ignore
/// use subplug_sdk::prelude::*;
///
/// static CONVERTER: FlexbufConverter = FlexbufConverter::new();
///
/// export_subplugin!(|registrar| {
///     registrar.register(
///         SubpluginKind::Converter,
///         "flexbuf",
///         SubpluginData::from_static(&CONVERTER),
///     );
/// });
/// ```
///
/// A body that ends in a value is rejected rather than silently dropped:
///
/// ```
/// use subplug_sdk::prelude::*;
///
/// static FLAG: u8 = 0;
///
/// subplug_sdk::export_subplugin!(|registrar| {
///     registrar.register(SubpluginKind::Filter, "flag", SubpluginData::from_static(&FLAG));
/// });
/// ```
///
/// ```compile_fail
/// use subplug_sdk::prelude::*;
///
/// static FLAG: u8 = 0;
///
/// subplug_sdk::export_subplugin!(|registrar| {
///     registrar.register(SubpluginKind::Filter, "flag", SubpluginData::from_static(&FLAG))
/// });
/// ```
#[macro_export]
macro_rules! export_subplugin {
    (|$registrar:ident| $body:block) => {
        #[no_mangle]
        pub extern "C" fn subplug_abi_version() -> u32 {
            $crate::SUBPLUG_ABI_VERSION
        }

        #[no_mangle]
        pub unsafe extern "C" fn subplug_init(registrar: *const $crate::SubpluginRegistrar) {
            // SAFETY: the loader passes a registrar that outlives this call.
            if let Some($registrar) = unsafe { registrar.as_ref() } {
                $body
            }
        }
    };
}
