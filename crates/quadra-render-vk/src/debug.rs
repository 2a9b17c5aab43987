// SPDX-License-Identifier: CEPL-1.0
use std::borrow::Cow;
use std::ffi::{c_void, CStr};

use ash::ext::debug_utils as ext_debug;
use ash::vk;
use tracing::{debug, error, info, warn};

use crate::config::DebugLevel;
use crate::error::{ApiContext, RenderResult};

fn kind_name(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let p_message = unsafe { (*data).p_message };
    let msg = if p_message.is_null() {
        Cow::Borrowed("<no message>")
    } else {
        unsafe { CStr::from_ptr(p_message) }.to_string_lossy()
    };
    let kind = kind_name(types);

    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if severity.contains(S::ERROR) {
        error!(kind, "[Vulkan] {msg}");
    } else if severity.contains(S::WARNING) {
        warn!(kind, "[Vulkan] {msg}");
    } else if severity.contains(S::INFO) {
        info!(kind, "[Vulkan] {msg}");
    } else {
        debug!(kind, "[Vulkan] {msg}");
    }

    // Never abort the call that triggered the message.
    vk::FALSE
}

/// Routes validation-layer output into `tracing`. Must be dropped before the
/// instance it was created from.
pub(crate) struct DebugMessenger {
    loader: ext_debug::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub(crate) fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        level: DebugLevel,
    ) -> RenderResult<Self> {
        let loader = ext_debug::Instance::new(entry, instance);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: level.severities(),
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            ..Default::default()
        };
        let handle = unsafe { loader.create_debug_utils_messenger(&ci, None) }
            .api("create_debug_utils_messenger")?;
        debug!(?level, "debug messenger installed");
        Ok(Self { loader, handle })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.handle, None)
        };
    }
}
