// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("could not load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("required instance extension {0} is not available")]
    MissingExtension(String),
    #[error("no physical device supports graphics and presentation to this surface")]
    NoSuitableDevice,
    #[error("surface query returned nothing: {0}")]
    SurfaceQueryFailed(&'static str),
    #[error("swap chain images do not support TRANSFER_DST (supported: {0:?})")]
    UnsupportedUsage(vk::ImageUsageFlags),
    #[error("FIFO present mode is not supported by the surface")]
    NoPresentMode,
    #[error("swap chain was created without images")]
    NoSwapchainImages,
    #[error("frame cannot be recorded: {0}")]
    InvalidFrameState(&'static str),
    #[error("waiting for the frame fence took longer than a second")]
    FenceTimeout,
    #[error("swap chain image acquisition failed: {0}")]
    AcquireFailed(vk::Result),
    #[error("image presentation failed: {0}")]
    PresentFailed(vk::Result),
    #[error("queue submission failed: {0}")]
    SubmitFailed(vk::Result),
    #[error("no memory type satisfies the requested properties")]
    NoMemoryType,
    #[error("could not load shader bytecode from {}", .0.display())]
    ShaderLoad(PathBuf),
    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

pub type VkResult<T> = Result<T, VkError>;

/// Names the API call a raw `vk::Result` came from.
pub(crate) trait VkResultExt<T> {
    fn during(self, call: &'static str) -> VkResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn during(self, call: &'static str) -> VkResult<T> {
        self.map_err(|result| VkError::Vulkan { call, result })
    }
}
