// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr, CString};

use ash::ext::debug_utils as ext_debug;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info};

use crate::config::{AppInfo, VkConfig};
use crate::debug::DebugMessenger;
use crate::error::{ApiContext, RenderError, RenderResult};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Names in `required` that do not appear in `available`, in `required` order.
pub(crate) fn missing_names<'r, 'a>(
    required: &[&'r CStr],
    available: impl IntoIterator<Item = &'a CStr>,
) -> Vec<&'r CStr> {
    let available: Vec<&CStr> = available.into_iter().collect();
    required
        .iter()
        .copied()
        .filter(|name| !available.contains(name))
        .collect()
}

fn c_name(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

fn version((major, minor, patch): (u32, u32, u32)) -> u32 {
    vk::make_api_version(0, major, minor, patch)
}

/// Loader entry, instance and the optional validation messenger.
///
/// Outlives the presentation surface and the device context.
pub struct InstanceContext {
    debug: Option<DebugMessenger>,
    instance: ash::Instance,
    entry: ash::Entry,
}

impl InstanceContext {
    pub fn new(display: RawDisplayHandle, cfg: &VkConfig) -> RenderResult<Self> {
        let entry = unsafe { ash::Entry::load()? };

        if cfg.validation {
            let layers = unsafe { entry.enumerate_instance_layer_properties() }
                .api("enumerate_instance_layer_properties")?;
            let names = layers
                .iter()
                .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) });
            if !missing_names(&[VALIDATION_LAYER], names).is_empty() {
                error!("validation requested; install the Vulkan SDK or set QUADRA_VALIDATION=0");
                return Err(RenderError::ValidationLayerMissing(
                    VALIDATION_LAYER.to_string_lossy().into_owned(),
                ));
            }
        }

        let mut required: Vec<&CStr> = ash_window::enumerate_required_extensions(display)
            .api("enumerate_required_extensions")?
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect();
        if cfg.validation {
            required.push(ext_debug::NAME);
        }

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .api("enumerate_instance_extension_properties")?;
        let missing = missing_names(
            &required,
            available
                .iter()
                .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }),
        );
        if !missing.is_empty() {
            return Err(RenderError::MissingExtensions(
                missing
                    .iter()
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect(),
            ));
        }

        let instance = create_instance(&entry, &cfg.app, &required, cfg.validation)?;
        info!(
            "Vulkan instance ready (validation={}, extensions={})",
            cfg.validation,
            required.len()
        );

        let mut ctx = Self {
            debug: None,
            instance,
            entry,
        };
        if cfg.validation {
            ctx.debug = Some(DebugMessenger::new(
                &ctx.entry,
                &ctx.instance,
                cfg.debug_level,
            )?);
        }
        Ok(ctx)
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }
}

fn create_instance(
    entry: &ash::Entry,
    app: &AppInfo,
    extensions: &[&CStr],
    validation: bool,
) -> RenderResult<ash::Instance> {
    let app_name = c_name(&app.app_name);
    let engine_name = c_name(&app.engine_name);

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: version(app.app_version),
        p_engine_name: engine_name.as_ptr(),
        engine_version: version(app.engine_version),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let ext_ptrs: Vec<*const c_char> = extensions.iter().map(|n| n.as_ptr()).collect();
    let layer_ptrs: Vec<*const c_char> = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };
    debug!(?extensions, validation, "creating instance");

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        ..Default::default()
    };

    unsafe { entry.create_instance(&create_info, None) }.api("create_instance")
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        // The messenger is a child of the instance.
        self.debug = None;
        unsafe { self.instance.destroy_instance(None) };
    }
}
