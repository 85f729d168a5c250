//! Base element for GL-rendered audio visualizers.
//!
//! [`GlAudioVisualizer`] takes care of finding or creating a GL context,
//! starting and stopping a [`GlVisualizer`] implementation on the context's
//! GL thread, negotiating a GL-backed output pool and dispatching each frame's
//! render onto the GL thread.

mod base;
mod bus;
mod caps;
mod error;
mod frame;
mod pool;

pub use base::{
    ContextProvider, ElementState, GlAudioVisualizer, GlVisualizer, HostContext, LifecycleState,
    StateChange, REGISTRATION_ATTEMPTS,
};
pub use bus::{Bus, ElementMessage, ErrorDomain, BUS_CAPACITY};
pub use caps::{
    AudioFormat, AudioInfo, AudioLayout, Component, VideoFormat, VideoInfo, AUDIO_CHANNELS,
    AUDIO_RATE, STEREO_CHANNEL_MASK,
};
pub use error::GlError;
pub use frame::{AudioBuffer, VideoFrame};
pub use pool::{
    negotiate_pool, AllocationProposal, AllocationQuery, BufferPool, MetaApi, PoolConfig,
    PoolError, PoolOption,
};
