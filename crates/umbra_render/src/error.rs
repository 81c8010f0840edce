//! Error types for the light registry

use thiserror::Error;
use umbra_structures::PoolError;

use crate::command::CommandKind;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Shadow atlas errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtlasError {
    /// Atlas size and tile size do not describe a square tile grid
    #[error("Invalid atlas geometry: size {size}, tile size {tile_size}")]
    InvalidGeometry { size: u32, tile_size: u32 },

    /// Requested region has a zero dimension
    #[error("Invalid region request of {width} x {height} tiles (grid is {grid} x {grid})")]
    InvalidRequest { width: u32, height: u32, grid: u32 },

    /// No free region of the requested size exists
    #[error("No free region of {width} x {height} tiles")]
    NotFound { width: u32, height: u32 },

    /// Region lies (partly) outside the atlas
    #[error("Region {0:?} lies outside the atlas")]
    OutOfBounds([u32; 4]),

    /// Region is not fully reserved
    #[error("Region {0:?} is not fully reserved")]
    NotReserved([u32; 4]),
}

/// Command record errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// A push would exceed the fixed field capacity of the record
    #[error("{kind:?} command overflow: {requested} fields requested, capacity is {capacity}")]
    Overflow {
        kind: CommandKind,
        requested: usize,
        capacity: usize,
    },
}

/// Update scheduler errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Every update slot of this frame has been claimed
    #[error("Shadow update budget exhausted")]
    BudgetExhausted,

    /// The source already holds an update slot this frame
    #[error("Shadow source {0} already claimed an update slot this frame")]
    AlreadyClaimed(usize),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Atlas geometry is invalid
    #[error(transparent)]
    Atlas(#[from] AtlasError),

    /// Shadow update distance must be a positive number
    #[error("Invalid shadow update distance: {0}")]
    InvalidUpdateDistance(f32),

    /// Energy scale must be a positive number
    #[error("Invalid energy scale: {0}")]
    InvalidEnergyScale(f32),
}

/// Light mutation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LightError {
    /// The operation is not allowed while the light holds a slot
    #[error("Light is attached to slot {0}; detach it first")]
    Attached(usize),

    /// Shadow map resolution outside the supported range
    #[error("Shadow resolution {0} outside [{min}, {max}]", min = crate::light::MIN_SHADOW_RESOLUTION, max = crate::light::MAX_SHADOW_RESOLUTION)]
    InvalidResolution(u32),

    /// Near plane too close to zero
    #[error("Near plane {0} must be greater than {min}", min = crate::light::MIN_NEAR_PLANE)]
    InvalidNearPlane(f32),
}

/// Light registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The light already holds a slot
    #[error("Light is already attached to slot {0}")]
    AlreadyAttached(usize),

    /// The light holds no slot in this registry
    #[error("Light is not attached")]
    NotAttached,

    /// Every light slot is in use
    #[error("Light limit of {0} reached")]
    CapacityExceeded(usize),

    /// Slot pool precondition violated
    #[error("Slot pool error: {0}")]
    Pool(#[from] PoolError),

    /// Atlas precondition violated
    #[error(transparent)]
    Atlas(#[from] AtlasError),

    /// Command record overflow
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid light mutation
    #[error(transparent)]
    Light(#[from] LightError),
}
