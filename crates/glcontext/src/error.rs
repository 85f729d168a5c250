use std::fmt;

/// Decoded value of `glGetError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlErrorCode {
    NoError,
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    StackOverflow,
    StackUnderflow,
    OutOfMemory,
    InvalidFramebufferOperation,
    ContextLost,
    Unknown(u32),
}

impl GlErrorCode {
    pub const GL_NO_ERROR: u32 = 0;
    pub const GL_INVALID_ENUM: u32 = 0x0500;
    pub const GL_INVALID_VALUE: u32 = 0x0501;
    pub const GL_INVALID_OPERATION: u32 = 0x0502;
    pub const GL_STACK_OVERFLOW: u32 = 0x0503;
    pub const GL_STACK_UNDERFLOW: u32 = 0x0504;
    pub const GL_OUT_OF_MEMORY: u32 = 0x0505;
    pub const GL_INVALID_FRAMEBUFFER_OPERATION: u32 = 0x0506;
    pub const GL_CONTEXT_LOST: u32 = 0x0507;

    pub fn from_raw(code: u32) -> Self {
        match code {
            Self::GL_NO_ERROR => Self::NoError,
            Self::GL_INVALID_ENUM => Self::InvalidEnum,
            Self::GL_INVALID_VALUE => Self::InvalidValue,
            Self::GL_INVALID_OPERATION => Self::InvalidOperation,
            Self::GL_STACK_OVERFLOW => Self::StackOverflow,
            Self::GL_STACK_UNDERFLOW => Self::StackUnderflow,
            Self::GL_OUT_OF_MEMORY => Self::OutOfMemory,
            Self::GL_INVALID_FRAMEBUFFER_OPERATION => Self::InvalidFramebufferOperation,
            Self::GL_CONTEXT_LOST => Self::ContextLost,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::NoError => Self::GL_NO_ERROR,
            Self::InvalidEnum => Self::GL_INVALID_ENUM,
            Self::InvalidValue => Self::GL_INVALID_VALUE,
            Self::InvalidOperation => Self::GL_INVALID_OPERATION,
            Self::StackOverflow => Self::GL_STACK_OVERFLOW,
            Self::StackUnderflow => Self::GL_STACK_UNDERFLOW,
            Self::OutOfMemory => Self::GL_OUT_OF_MEMORY,
            Self::InvalidFramebufferOperation => Self::GL_INVALID_FRAMEBUFFER_OPERATION,
            Self::ContextLost => Self::GL_CONTEXT_LOST,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_error(self) -> bool {
        self != Self::NoError
    }

    /// Symbolic GL name of the code.
    pub fn name(self) -> &'static str {
        match self {
            Self::NoError => "GL_NO_ERROR",
            Self::InvalidEnum => "GL_INVALID_ENUM",
            Self::InvalidValue => "GL_INVALID_VALUE",
            Self::InvalidOperation => "GL_INVALID_OPERATION",
            Self::StackOverflow => "GL_STACK_OVERFLOW",
            Self::StackUnderflow => "GL_STACK_UNDERFLOW",
            Self::OutOfMemory => "GL_OUT_OF_MEMORY",
            Self::InvalidFramebufferOperation => "GL_INVALID_FRAMEBUFFER_OPERATION",
            Self::ContextLost => "GL_CONTEXT_LOST",
            Self::Unknown(_) => "unknown error code",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::NoError => "No error",
            Self::InvalidEnum => "Enumeration parameter is not legal",
            Self::InvalidValue => "Value parameter is not legal",
            Self::InvalidOperation => "Set of state is not legal for the parameters given",
            Self::StackOverflow => "Stack pushing operation would overflow",
            Self::StackUnderflow => "Stack popping operation would underflow",
            Self::OutOfMemory => "Memory allocation failed",
            Self::InvalidFramebufferOperation => "Incomplete framebuffer operation",
            Self::ContextLost => "OpenGL context lost",
            Self::Unknown(_) => "Unrecognised error code",
        }
    }
}

impl fmt::Display for GlErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown error code - 0x{code:x}"),
            other => write!(f, "{} - {}", other.name(), other.description()),
        }
    }
}

/// Failures of the display/context layer.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to create GL display: {0}")]
    DisplayCreate(String),
    #[error("failed to create GL context: {message}")]
    Create {
        message: String,
        gl_error: Option<GlErrorCode>,
    },
    #[error("failed to spawn GL thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to activate GL context")]
    Activate,
    #[error("GL framebuffer is incomplete")]
    FramebufferIncomplete,
    #[error("GL error: {0}")]
    Gl(GlErrorCode),
    #[error("GL thread has exited")]
    ThreadGone,
    #[error("dispatched GL call panicked: {0}")]
    Panicked(String),
    #[error("cannot dispatch onto the GL thread from the GL thread itself")]
    Reentrant,
    #[error("context registration with the display did not settle after {0} attempts")]
    RegistrationContended(usize),
}

impl ContextError {
    /// The GL error code attached to the failure, if any.
    pub fn gl_error(&self) -> Option<GlErrorCode> {
        match self {
            ContextError::Create { gl_error, .. } => *gl_error,
            ContextError::Gl(code) => Some(*code),
            _ => None,
        }
    }
}
