// SPDX-License-Identifier: CEPL-1.0
//! Swap chain planning and lifecycle.
//!
//! [`plan_swapchain`] turns a surface support snapshot into creation
//! parameters without touching the device, so the selection rules can be
//! tested on their own. [`SwapchainManager`] applies a plan: it waits for
//! the device, replaces the chain wholesale and rebuilds one view per image.
//! The device side sits behind [`SwapchainTarget`].

use crate::context::DeviceContext;
use crate::error::{VkError, VkResult, VkResultExt};
use crate::handles::ImageView;
use ash::khr::swapchain;
use ash::vk;
use hello_render::RenderSize;
use tracing::{error, info};

const REQUIRED_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

const FALLBACK_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// What the surface reports for one physical device.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(ctx: &DeviceContext) -> VkResult<Self> {
        let loader = ctx.surface_loader();
        let (phys, surface) = (ctx.physical_device(), ctx.surface());
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(phys, surface)
                    .during("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
                formats: loader
                    .get_physical_device_surface_formats(phys, surface)
                    .during("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(phys, surface)
                    .during("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
            })
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainPlan {
    pub image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub transform: vk::SurfaceTransformFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
}

#[cfg(test)]
fn same_format(a: vk::SurfaceFormatKHR, b: vk::SurfaceFormatKHR) -> bool {
    a.format == b.format && a.color_space == b.color_space
}

/// One more than the minimum, capped by the maximum (0 == no maximum).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        want.min(caps.max_image_count)
    } else {
        want
    }
}

pub fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    match formats {
        [] => None,
        [only] if only.format == vk::Format::UNDEFINED => Some(FALLBACK_FORMAT),
        _ => formats
            .iter()
            .copied()
            .find(|f| f.format == vk::Format::R8G8B8A8_UNORM)
            .or(Some(formats[0])),
    }
}

/// Uses the surface extent verbatim unless the surface leaves it to us.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, hint: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: hint
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: hint
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

pub fn choose_usage(caps: &vk::SurfaceCapabilitiesKHR) -> VkResult<vk::ImageUsageFlags> {
    if caps.supported_usage_flags.contains(REQUIRED_USAGE) {
        Ok(REQUIRED_USAGE)
    } else {
        error!(
            "swap chain images do not support the required usage; supported: {:?}",
            caps.supported_usage_flags
        );
        Err(VkError::UnsupportedUsage(caps.supported_usage_flags))
    }
}

pub fn choose_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> VkResult<vk::PresentModeKHR> {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO]
        .into_iter()
        .find(|m| modes.contains(m))
        .ok_or_else(|| {
            error!("FIFO present mode is not supported");
            VkError::NoPresentMode
        })
}

/// Derives creation parameters. `Ok(None)` means the surface currently has
/// no area (minimized) and no chain should be built.
pub fn plan_swapchain(
    support: &SurfaceSupport,
    hint: RenderSize,
) -> VkResult<Option<SwapchainPlan>> {
    if support.formats.is_empty() {
        error!("surface reports no formats");
        return Err(VkError::SurfaceQueryFailed("formats"));
    }
    if support.present_modes.is_empty() {
        error!("surface reports no present modes");
        return Err(VkError::SurfaceQueryFailed("present modes"));
    }
    let caps = &support.capabilities;

    let image_count = choose_image_count(caps);
    let format = choose_format(&support.formats).ok_or(VkError::SurfaceQueryFailed("formats"))?;
    let extent = choose_extent(caps, hint);
    let usage = choose_usage(caps)?;
    let transform = choose_transform(caps);
    let present_mode = choose_present_mode(&support.present_modes)?;

    if extent.width == 0 || extent.height == 0 {
        return Ok(None);
    }

    Ok(Some(SwapchainPlan {
        image_count,
        format,
        extent,
        usage,
        transform,
        present_mode,
    }))
}

struct SwapchainHandle {
    loader: swapchain::Device,
    raw: vk::SwapchainKHR,
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_swapchain(self.raw, None) };
    }
}

/// A live chain. Views are declared first so they go before their images.
pub struct Chain {
    views: Vec<ImageView>,
    images: Vec<vk::Image>,
    format: vk::Format,
    extent: vk::Extent2D,
    handle: SwapchainHandle,
}

/// A chain without images cannot be drawn to.
pub fn check_images(images: Vec<vk::Image>) -> VkResult<Vec<vk::Image>> {
    if images.is_empty() {
        error!("swap chain has no images");
        return Err(VkError::NoSwapchainImages);
    }
    Ok(images)
}

/// Device-side work of a recreation, separated so the manager's state
/// transitions can be exercised without a GPU.
pub trait SwapchainTarget {
    type Chain;

    fn wait_idle(&self) -> VkResult<()>;
    fn surface_support(&self) -> VkResult<SurfaceSupport>;
    /// Builds a chain for `plan`, handing `old` to the driver for reuse.
    fn build_chain(&self, plan: &SwapchainPlan, old: Option<&Self::Chain>)
        -> VkResult<Self::Chain>;
}

impl SwapchainTarget for DeviceContext {
    type Chain = Chain;

    fn wait_idle(&self) -> VkResult<()> {
        DeviceContext::wait_idle(self)
    }

    fn surface_support(&self) -> VkResult<SurfaceSupport> {
        SurfaceSupport::query(self)
    }

    fn build_chain(&self, plan: &SwapchainPlan, old: Option<&Chain>) -> VkResult<Chain> {
        let ci = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface(),
            min_image_count: plan.image_count,
            image_format: plan.format.format,
            image_color_space: plan.format.color_space,
            image_extent: plan.extent,
            image_array_layers: 1,
            image_usage: plan.usage,
            // Ownership moves between queue families through explicit barriers.
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: plan.transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            old_swapchain: old.map_or(vk::SwapchainKHR::null(), |c| c.handle.raw),
            ..Default::default()
        };

        let loader = self.swapchain_loader();
        let raw = unsafe { loader.create_swapchain(&ci, None) }
            .during("vkCreateSwapchainKHR")
            .inspect_err(|e| error!("could not create swap chain: {e}"))?;
        let handle = SwapchainHandle {
            loader: loader.clone(),
            raw,
        };

        let images = check_images(
            unsafe { loader.get_swapchain_images(raw) }.during("vkGetSwapchainImagesKHR")?,
        )?;
        let views = images
            .iter()
            .map(|&img| ImageView::color_2d(self.device(), img, plan.format.format))
            .collect::<VkResult<Vec<_>>>()
            .inspect_err(|e| error!("could not create swap chain image view: {e}"))?;

        info!(
            "vk: swap chain {:?}/{:?}, {:?}, {}x{}, {} images",
            plan.format.format,
            plan.format.color_space,
            plan.present_mode,
            plan.extent.width,
            plan.extent.height,
            images.len()
        );

        Ok(Chain {
            views,
            images,
            format: plan.format.format,
            extent: plan.extent,
            handle,
        })
    }
}

pub struct SwapchainManager<C = Chain> {
    chain: Option<C>,
    ready: bool,
    recreations: u64,
}

impl<C> SwapchainManager<C> {
    pub fn new<T>(target: &T, hint: RenderSize) -> VkResult<Self>
    where
        T: SwapchainTarget<Chain = C>,
    {
        let mut mgr = Self {
            chain: None,
            ready: false,
            recreations: 0,
        };
        mgr.create_or_recreate(target, hint)?;
        Ok(mgr)
    }

    /// Safe to call at any time after device creation. The device is idle
    /// when this returns, whatever the outcome. On a zero-sized surface this
    /// succeeds with rendering disabled and the current chain left in place.
    pub fn create_or_recreate<T>(&mut self, target: &T, hint: RenderSize) -> VkResult<()>
    where
        T: SwapchainTarget<Chain = C>,
    {
        self.ready = false;
        self.recreations += 1;
        target.wait_idle()?;

        let support = target.surface_support()?;
        let Some(plan) = plan_swapchain(&support, hint)? else {
            info!("vk: surface extent is 0x0; rendering paused");
            return Ok(());
        };

        // The old chain is retired by the attempt, so it goes either way.
        let built = target.build_chain(&plan, self.chain.as_ref());
        self.chain = None;
        self.chain = Some(built?);
        self.ready = true;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready && self.chain.is_some()
    }

    /// Number of `create_or_recreate` calls so far, the initial one included.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    pub fn chain(&self) -> Option<&C> {
        self.chain.as_ref()
    }
}

impl SwapchainManager<Chain> {
    pub fn raw(&self) -> vk::SwapchainKHR {
        self.chain
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |c| c.handle.raw)
    }

    pub fn format(&self) -> Option<vk::Format> {
        self.chain.as_ref().map(|c| c.format)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.chain.as_ref().map_or(vk::Extent2D::default(), |c| c.extent)
    }

    pub fn image_count(&self) -> usize {
        self.chain.as_ref().map_or(0, |c| c.images.len())
    }

    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.chain.as_ref()?.images.get(index as usize).copied()
    }

    pub fn view(&self, index: u32) -> Option<vk::ImageView> {
        self.chain
            .as_ref()?
            .views
            .get(index as usize)
            .map(ImageView::raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    fn caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: 500,
                height: 500,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            ..Default::default()
        }
    }

    fn fmt(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn support() -> SurfaceSupport {
        SurfaceSupport {
            capabilities: caps(),
            formats: vec![fmt(vk::Format::B8G8R8A8_UNORM), fmt(vk::Format::R8G8B8A8_UNORM)],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    const HINT: RenderSize = RenderSize {
        width: 500,
        height: 500,
    };
    const ZERO: RenderSize = RenderSize {
        width: 0,
        height: 0,
    };

    #[test]
    fn image_count_stays_within_bounds() {
        for min in 1..6 {
            for max in [0, min, min + 1, min + 4] {
                let c = vk::SurfaceCapabilitiesKHR {
                    min_image_count: min,
                    max_image_count: max,
                    ..caps()
                };
                let n = choose_image_count(&c);
                assert!(n >= min, "min={min} max={max} picked {n}");
                if max > 0 {
                    assert!(n <= max, "min={min} max={max} picked {n}");
                }
            }
        }
        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..caps()
        };
        assert_eq!(choose_image_count(&unbounded), 4);
    }

    #[test]
    fn rgba8_entry_wins() {
        let formats = [
            fmt(vk::Format::B8G8R8A8_SRGB),
            fmt(vk::Format::A2B10G10R10_UNORM_PACK32),
            fmt(vk::Format::R8G8B8A8_UNORM),
        ];
        let picked = choose_format(&formats).unwrap();
        assert_eq!(picked.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn single_undefined_entry_is_free_choice() {
        let picked = choose_format(&[fmt(vk::Format::UNDEFINED)]).unwrap();
        assert!(same_format(picked, FALLBACK_FORMAT));
    }

    #[test]
    fn otherwise_first_format() {
        let formats = [fmt(vk::Format::B8G8R8A8_SRGB), fmt(vk::Format::B8G8R8A8_UNORM)];
        assert_eq!(
            choose_format(&formats).unwrap().format,
            vk::Format::B8G8R8A8_SRGB
        );
        assert!(choose_format(&[]).is_none());
    }

    #[test]
    fn extent_current_or_clamped_hint() {
        assert_eq!(
            choose_extent(&caps(), RenderSize { width: 10, height: 10 }),
            vk::Extent2D {
                width: 500,
                height: 500
            }
        );

        let free = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            ..caps()
        };
        assert_eq!(
            choose_extent(&free, RenderSize { width: 8000, height: 8 }),
            vk::Extent2D {
                width: 1024,
                height: 64
            }
        );
        assert_eq!(
            choose_extent(&free, HINT),
            vk::Extent2D {
                width: 500,
                height: 500
            }
        );
    }

    #[test]
    fn transfer_dst_is_required() {
        let c = vk::SurfaceCapabilitiesKHR {
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            ..caps()
        };
        assert!(matches!(
            choose_usage(&c),
            Err(VkError::UnsupportedUsage(f)) if f == vk::ImageUsageFlags::COLOR_ATTACHMENT
        ));
        assert_eq!(choose_usage(&caps()).unwrap(), REQUIRED_USAGE);
    }

    #[test]
    fn transform_prefers_identity() {
        assert_eq!(
            choose_transform(&caps()),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );
        let rotated = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..caps()
        };
        assert_eq!(
            choose_transform(&rotated),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );
    }

    #[test]
    fn present_mode_fallbacks() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX])
                .unwrap(),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO])
                .unwrap(),
            vk::PresentModeKHR::FIFO
        );
        assert!(matches!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            Err(VkError::NoPresentMode)
        ));
    }

    #[test]
    fn empty_queries_fail() {
        let mut s = support();
        s.formats.clear();
        assert!(matches!(
            plan_swapchain(&s, HINT),
            Err(VkError::SurfaceQueryFailed("formats"))
        ));

        let mut s = support();
        s.present_modes.clear();
        assert!(matches!(
            plan_swapchain(&s, HINT),
            Err(VkError::SurfaceQueryFailed("present modes"))
        ));
    }

    #[test]
    fn zero_extent_plans_nothing() {
        let mut s = support();
        s.capabilities.current_extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
        assert!(plan_swapchain(&s, HINT).unwrap().is_none());

        let mut s = support();
        s.capabilities.current_extent.width = u32::MAX;
        s.capabilities.min_image_extent = vk::Extent2D::default();
        assert!(plan_swapchain(&s, RenderSize { width: 0, height: 300 })
            .unwrap()
            .is_none());
    }

    #[test]
    fn planning_is_idempotent() {
        let s = support();
        let a = plan_swapchain(&s, HINT).unwrap().unwrap();
        let b = plan_swapchain(&s, HINT).unwrap().unwrap();
        assert_eq!(a.image_count, b.image_count);
        assert!(same_format(a.format, b.format));
        assert_eq!(a.extent, b.extent);
        assert_eq!(a.image_count, 3);
        assert_eq!(a.format.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(a.present_mode, vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn empty_image_list_is_rejected() {
        assert!(matches!(
            check_images(Vec::new()),
            Err(VkError::NoSwapchainImages)
        ));
        let images = vec![vk::Image::null(); 3];
        assert_eq!(check_images(images).unwrap().len(), 3);
    }

    #[derive(Debug, PartialEq, Eq)]
    struct FakeChain {
        id: u32,
        replaced: Option<u32>,
    }

    #[derive(Default)]
    struct FakeTarget {
        supports: RefCell<VecDeque<SurfaceSupport>>,
        builds: RefCell<VecDeque<VkResult<()>>>,
        next_id: Cell<u32>,
        idle_waits: Cell<u32>,
    }

    impl FakeTarget {
        fn push(&self, support: SurfaceSupport) {
            self.supports.borrow_mut().push_back(support);
        }
    }

    impl SwapchainTarget for FakeTarget {
        type Chain = FakeChain;

        fn wait_idle(&self) -> VkResult<()> {
            self.idle_waits.set(self.idle_waits.get() + 1);
            Ok(())
        }

        fn surface_support(&self) -> VkResult<SurfaceSupport> {
            Ok(self.supports.borrow_mut().pop_front().unwrap_or_else(support))
        }

        fn build_chain(
            &self,
            _plan: &SwapchainPlan,
            old: Option<&FakeChain>,
        ) -> VkResult<FakeChain> {
            self.builds.borrow_mut().pop_front().unwrap_or(Ok(()))?;
            self.next_id.set(self.next_id.get() + 1);
            Ok(FakeChain {
                id: self.next_id.get(),
                replaced: old.map(|c| c.id),
            })
        }
    }

    fn minimized() -> SurfaceSupport {
        let mut s = support();
        s.capabilities.current_extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
        s
    }

    #[test]
    fn minimized_surface_pauses_and_keeps_chain() {
        let target = FakeTarget::default();
        let mut mgr = SwapchainManager::new(&target, HINT).unwrap();
        assert!(mgr.is_ready());
        assert_eq!(mgr.chain().map(|c| c.id), Some(1));

        target.push(minimized());
        mgr.create_or_recreate(&target, ZERO).unwrap();
        assert!(!mgr.is_ready());
        assert_eq!(
            mgr.chain(),
            Some(&FakeChain {
                id: 1,
                replaced: None
            })
        );
        assert_eq!(mgr.recreations(), 2);
        assert_eq!(target.idle_waits.get(), 2);

        mgr.create_or_recreate(&target, HINT).unwrap();
        assert!(mgr.is_ready());
        assert_eq!(
            mgr.chain(),
            Some(&FakeChain {
                id: 2,
                replaced: Some(1)
            })
        );
        assert_eq!(mgr.recreations(), 3);
    }

    #[test]
    fn minimized_at_startup_builds_nothing() {
        let target = FakeTarget::default();
        target.push(minimized());
        let mut mgr = SwapchainManager::new(&target, ZERO).unwrap();
        assert!(!mgr.is_ready());
        assert!(mgr.chain().is_none());
        assert_eq!(mgr.recreations(), 1);

        mgr.create_or_recreate(&target, HINT).unwrap();
        assert!(mgr.is_ready());
        assert_eq!(mgr.chain().map(|c| c.replaced), Some(None));
    }

    #[test]
    fn failed_build_drops_retired_chain() {
        let target = FakeTarget::default();
        let mut mgr = SwapchainManager::new(&target, HINT).unwrap();

        target
            .builds
            .borrow_mut()
            .push_back(Err(VkError::NoSwapchainImages));
        assert!(matches!(
            mgr.create_or_recreate(&target, HINT),
            Err(VkError::NoSwapchainImages)
        ));
        assert!(!mgr.is_ready());
        assert!(mgr.chain().is_none());

        mgr.create_or_recreate(&target, HINT).unwrap();
        assert_eq!(mgr.chain().map(|c| c.replaced), Some(None));
    }
}
