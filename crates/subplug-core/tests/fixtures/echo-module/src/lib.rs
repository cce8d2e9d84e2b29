//! Echo subplugin: registers two filter names that share one payload.

use subplug_sdk::export_subplugin;
use subplug_sdk::prelude::*;

/// Value the tests read back through the payload pointer.
pub static ECHO_MAGIC: u32 = 0x5EC0_0001;

export_subplugin!(|registrar| {
    let data = SubpluginData::from_static(&ECHO_MAGIC);
    registrar.register(SubpluginKind::Filter, "echo", data);
    registrar.register(SubpluginKind::Filter, "echo_alias", data);
});
