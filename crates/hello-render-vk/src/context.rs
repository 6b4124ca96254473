// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface and logical device ownership plus physical device selection.

use crate::error::{VkError, VkResult, VkResultExt};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use std::ffi::{c_char, CStr};
use tracing::{debug, error, info, trace, warn};

const MIN_IMAGE_DIMENSION_2D: u32 = 4096;
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Copy, Debug)]
pub struct Queue {
    pub handle: vk::Queue,
    pub family: u32,
}

/// Graphics and present queue family indices chosen for a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    pub supports_present: bool,
}

/// The facts device selection looks at, gathered per physical device.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub api_version: u32,
    pub max_image_dimension_2d: u32,
    pub has_swapchain_extension: bool,
    pub families: Vec<QueueFamilyInfo>,
}

/// Prefers one family doing both graphics and present; otherwise the first
/// graphics family paired with the first present family.
pub fn select_queue_families(families: &[QueueFamilyInfo]) -> Option<QueueFamilies> {
    let mut graphics = None;
    for (i, f) in families.iter().enumerate() {
        if f.queue_count > 0 && f.flags.contains(vk::QueueFlags::GRAPHICS) {
            let i = i as u32;
            graphics.get_or_insert(i);
            if f.supports_present {
                return Some(QueueFamilies {
                    graphics: i,
                    present: i,
                });
            }
        }
    }
    let present = families
        .iter()
        .position(|f| f.queue_count > 0 && f.supports_present)? as u32;
    Some(QueueFamilies {
        graphics: graphics?,
        present,
    })
}

pub fn check_candidate(c: &DeviceCandidate) -> Option<QueueFamilies> {
    if !c.has_swapchain_extension {
        return None;
    }
    if vk::api_version_major(c.api_version) < 1 || c.max_image_dimension_2d < MIN_IMAGE_DIMENSION_2D
    {
        return None;
    }
    select_queue_families(&c.families)
}

/// Index of the selected candidate. The last suitable device in
/// enumeration order wins.
pub fn pick_device(candidates: &[DeviceCandidate]) -> Option<(usize, QueueFamilies)> {
    candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| check_candidate(c).map(|q| (i, q)))
        .last()
}

// STRICT TEARDOWN ORDER is carried by the field order of DeviceContext:
// device, debug messenger, surface, instance (entry unloads last).

struct InstanceHandle {
    instance: ash::Instance,
    entry: Entry,
}

impl Drop for InstanceHandle {
    fn drop(&mut self) {
        unsafe { self.instance.destroy_instance(None) };
    }
}

struct SurfaceHandle {
    loader: surface::Instance,
    raw: vk::SurfaceKHR,
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.raw, None) };
    }
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    raw: vk::DebugUtilsMessengerEXT,
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.raw, None) };
    }
}

struct LogicalDevice {
    device: ash::Device,
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe { self.device.destroy_device(None) };
    }
}

/// Owns every instance- and device-level object; other components borrow it.
pub struct DeviceContext {
    device: LogicalDevice,
    swapchain_loader: swapchain::Device,
    graphics_queue: Queue,
    present_queue: Queue,
    separate_present: bool,
    physical: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    _debug: Option<DebugMessenger>,
    surface: SurfaceHandle,
    instance: InstanceHandle,
}

impl DeviceContext {
    pub fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> VkResult<Self> {
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();

        let entry = unsafe { Entry::load() }?;
        let (instance, validation) = create_instance(entry, dh)?;

        let debug = if validation {
            create_debug_messenger(&instance)
        } else {
            None
        };

        let raw_surface = unsafe {
            ash_window::create_surface(&instance.entry, &instance.instance, dh, wh, None)
        }
        .during("vkCreateSurfaceKHR")?;
        let surface = SurfaceHandle {
            loader: surface::Instance::new(&instance.entry, &instance.instance),
            raw: raw_surface,
        };

        let (physical, families) = select_physical_device(&instance.instance, &surface)?;
        let device = create_logical_device(&instance.instance, physical, families)?;

        let graphics_queue = Queue {
            handle: unsafe { device.device.get_device_queue(families.graphics, 0) },
            family: families.graphics,
        };
        let present_queue = Queue {
            handle: unsafe { device.device.get_device_queue(families.present, 0) },
            family: families.present,
        };
        let memory_properties = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical)
        };
        let swapchain_loader = swapchain::Device::new(&instance.instance, &device.device);

        Ok(Self {
            device,
            swapchain_loader,
            graphics_queue,
            present_queue,
            separate_present: !families.is_shared(),
            physical,
            memory_properties,
            _debug: debug,
            surface,
            instance,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device.device
    }

    pub fn swapchain_loader(&self) -> &swapchain::Device {
        &self.swapchain_loader
    }

    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface.loader
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.raw
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn graphics_queue(&self) -> Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> Queue {
        self.present_queue
    }

    /// Decided once at device selection; drives the ownership barriers.
    pub fn separate_present_queue(&self) -> bool {
        self.separate_present
    }

    pub fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device().device_wait_idle() }.during("vkDeviceWaitIdle")
    }
}

fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == name)
}

fn create_instance(entry: Entry, display: RawDisplayHandle) -> VkResult<(InstanceHandle, bool)> {
    let available = unsafe { entry.enumerate_instance_extension_properties(None) }
        .during("vkEnumerateInstanceExtensionProperties")?;

    let required = ash_window::enumerate_required_extensions(display)
        .during("enumerate_required_extensions")?;
    let mut extensions: Vec<*const c_char> = Vec::with_capacity(required.len() + 1);
    for &ext in required {
        let name = unsafe { CStr::from_ptr(ext) };
        if !has_extension(&available, name) {
            error!("could not find instance extension named {name:?}");
            return Err(VkError::MissingExtension(name.to_string_lossy().into_owned()));
        }
        extensions.push(ext);
    }

    let validation = cfg!(debug_assertions)
        && has_extension(&available, ash::ext::debug_utils::NAME)
        && unsafe { entry.enumerate_instance_layer_properties() }
            .unwrap_or_default()
            .iter()
            .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER);
    let layers = [VALIDATION_LAYER.as_ptr()];
    if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: c"Hello".as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: c"HelloEngine".as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: if validation { layers.len() as u32 } else { 0 },
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    let instance =
        unsafe { entry.create_instance(&create_info, None) }.during("vkCreateInstance")?;
    if validation {
        info!("vk: validation layer enabled");
    }
    Ok((InstanceHandle { instance, entry }, validation))
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("[vulkan] {msg}");
    } else {
        trace!("[vulkan] {msg}");
    }
    vk::FALSE
}

fn create_debug_messenger(instance: &InstanceHandle) -> Option<DebugMessenger> {
    let loader = ash::ext::debug_utils::Instance::new(&instance.entry, &instance.instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    match unsafe { loader.create_debug_utils_messenger(&ci, None) } {
        Ok(raw) => Some(DebugMessenger { loader, raw }),
        Err(e) => {
            warn!("vk: debug messenger unavailable: {e}");
            None
        }
    }
}

fn describe_device(
    instance: &ash::Instance,
    surface: &SurfaceHandle,
    phys: vk::PhysicalDevice,
) -> DeviceCandidate {
    let props = unsafe { instance.get_physical_device_properties(phys) };
    let has_swapchain_extension = match unsafe {
        instance.enumerate_device_extension_properties(phys)
    } {
        Ok(exts) => has_extension(&exts, swapchain::NAME),
        Err(e) => {
            warn!("vk: device extension enumeration failed: {e}");
            false
        }
    };

    let families = unsafe { instance.get_physical_device_queue_family_properties(phys) }
        .iter()
        .enumerate()
        .map(|(i, q)| QueueFamilyInfo {
            flags: q.queue_flags,
            queue_count: q.queue_count,
            supports_present: unsafe {
                surface
                    .loader
                    .get_physical_device_surface_support(phys, i as u32, surface.raw)
            }
            .unwrap_or(false),
        })
        .collect();

    DeviceCandidate {
        api_version: props.api_version,
        max_image_dimension_2d: props.limits.max_image_dimension2_d,
        has_swapchain_extension,
        families,
    }
}

fn select_physical_device(
    instance: &ash::Instance,
    surface: &SurfaceHandle,
) -> VkResult<(vk::PhysicalDevice, QueueFamilies)> {
    let physical_devices =
        unsafe { instance.enumerate_physical_devices() }.during("vkEnumeratePhysicalDevices")?;

    let candidates: Vec<DeviceCandidate> = physical_devices
        .iter()
        .map(|&p| describe_device(instance, surface, p))
        .collect();

    let Some((index, families)) = pick_device(&candidates) else {
        error!(
            "could not select a physical device among {} candidates",
            candidates.len()
        );
        return Err(VkError::NoSuitableDevice);
    };

    let phys = physical_devices[index];
    let props = unsafe { instance.get_physical_device_properties(phys) };
    let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
    info!(
        "vk: using {:?} (graphics family {}, present family {})",
        name, families.graphics, families.present
    );
    Ok((phys, families))
}

fn create_logical_device(
    instance: &ash::Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
) -> VkResult<LogicalDevice> {
    let priorities = [1.0_f32];
    let mut queue_infos = vec![vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: families.graphics,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    }];
    if !families.is_shared() {
        queue_infos.push(vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: families.present,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        });
    }

    let device_exts = [swapchain::NAME.as_ptr()];
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };

    let device = unsafe { instance.create_device(phys, &dinfo, None) }.during("vkCreateDevice")?;
    Ok(LogicalDevice { device })
}
