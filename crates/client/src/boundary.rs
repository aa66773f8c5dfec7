//! Render boundary: a panic while rendering one screen becomes a value.

use std::panic::{AssertUnwindSafe, catch_unwind};

/// Result of rendering a screen inside [`contain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome<T> {
    Rendered(T),
    /// Rendering panicked; the screen offers a reload instead of taking the
    /// rest of the dashboard down.
    Failed { message: String, reload: bool },
}

impl<T> RenderOutcome<T> {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    pub fn rendered(self) -> Option<T> {
        match self {
            Self::Rendered(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }
}

/// Run `render`, converting a panic into [`RenderOutcome::Failed`].
pub fn contain<T>(screen: &str, render: impl FnOnce() -> T) -> RenderOutcome<T> {
    match catch_unwind(AssertUnwindSafe(render)) {
        Ok(value) => RenderOutcome::Rendered(value),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown error".to_string());
            tracing::error!(screen, "screen render failed: {message}");
            RenderOutcome::Failed { message, reload: true }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_render_passes_through() {
        assert_eq!(contain("users", || 3), RenderOutcome::Rendered(3));
    }

    #[test]
    fn panic_is_contained_with_reload_offer() {
        let outcome: RenderOutcome<()> = contain("payments", || panic!("row without supplier"));
        assert_eq!(
            outcome,
            RenderOutcome::Failed {
                message: "row without supplier".to_string(),
                reload: true,
            }
        );
        assert!(contain("payments", || 1).is_rendered());
    }
}
