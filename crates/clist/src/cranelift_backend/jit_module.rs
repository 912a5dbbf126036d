//! JIT module construction with runtime helper symbols pre-registered.

use cranelift_codegen::isa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::default_libcall_names;

use crate::config::JitConfig;
use crate::DefinitionError;

use super::runtime_helpers::runtime_helper_symbols;

fn backend_error(what: &str, err: impl std::fmt::Display) -> DefinitionError {
    DefinitionError::Backend(format!("{what}: {err}"))
}

/// Create a `JITBuilder` for the host with all list runtime helpers registered,
/// so that generated methods can call them.
pub(crate) fn create_jit_builder(config: &JitConfig) -> Result<JITBuilder, DefinitionError> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("use_colocated_libcalls", "false")
        .map_err(|e| backend_error("set use_colocated_libcalls", e))?;
    flag_builder
        .set("is_pic", "false")
        .map_err(|e| backend_error("set is_pic", e))?;
    flag_builder
        .set("opt_level", config.opt_level.as_setting())
        .map_err(|e| backend_error("set opt_level", e))?;
    flag_builder
        .set("enable_verifier", if config.verify { "true" } else { "false" })
        .map_err(|e| backend_error("set enable_verifier", e))?;

    let isa_builder = isa::lookup(target_lexicon::Triple::host())
        .map_err(|e| backend_error("isa lookup", e))?;
    let isa = isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| backend_error("isa finish", e))?;

    let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
    for (name, ptr) in runtime_helper_symbols() {
        builder.symbol(name, ptr);
    }
    Ok(builder)
}

/// Create a `JITModule` ready for installing generated list types.
pub(crate) fn create_jit_module(config: &JitConfig) -> Result<JITModule, DefinitionError> {
    let builder = create_jit_builder(config)?;
    Ok(JITModule::new(builder))
}
