use crate::platform::{ControlHandle, Subscription};

/// Whether a corrective write is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Next observation is a user press
    Idle,
    /// Next observation comes from our own write and is ignored
    Pending,
}

/// Resources held while the watcher is engaged
#[derive(Debug)]
pub struct Running {
    pub subscription: Subscription,
    pub control: ControlHandle,
    pub adjustment: Adjustment,
}

/// Watcher lifecycle
///
/// Subscription, control and adjustment only exist while started.
#[derive(Debug, Default)]
pub enum Phase {
    #[default]
    Stopped,
    Started(Running),
}

impl Phase {
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    pub const fn is_adjusting(&self) -> bool {
        matches!(
            self,
            Self::Started(Running {
                adjustment: Adjustment::Pending,
                ..
            })
        )
    }

    /// Move to `Stopped`, handing back whatever was held
    pub fn take(&mut self) -> Option<Running> {
        match std::mem::take(self) {
            Self::Started(running) => Some(running),
            Self::Stopped => None,
        }
    }
}
