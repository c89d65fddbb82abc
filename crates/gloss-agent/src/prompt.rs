//! Blocking user notices.
//!
//! The manager never renders anything itself; it reports failures and asks
//! for confirmation through a [`Prompt`].

pub const MISSING_FIELDS: &str = "Please fill in both question and answer fields";
pub const SAVE_FAILED: &str = "Error saving flashcard. Please try again.";
pub const CONFIRM_DELETE: &str = "Are you sure you want to delete this flashcard?";
pub const DELETE_FAILED: &str = "Error deleting flashcard. Please try again.";
pub const EXPORT_FAILED: &str = "Error exporting flashcards. Please try again.";

pub trait Prompt: Send + Sync {
  /// Show `message` and wait for the user to acknowledge it.
  fn alert(&self, message: &str);

  /// Ask a yes/no question.
  fn confirm(&self, message: &str) -> bool;
}

#[cfg(test)]
pub(crate) mod testing {
  use std::sync::Mutex;

  use super::Prompt;

  /// Records alerts and answers every confirmation with a fixed reply.
  #[derive(Default)]
  pub struct Scripted {
    pub alerts:   Mutex<Vec<String>>,
    pub confirms: Mutex<Vec<String>>,
    pub decline:  bool,
  }

  impl Scripted {
    pub fn declining() -> Self { Self { decline: true, ..Self::default() } }

    pub fn alerts(&self) -> Vec<String> { self.alerts.lock().unwrap().clone() }
  }

  impl Prompt for Scripted {
    fn alert(&self, message: &str) {
      self.alerts.lock().unwrap().push(message.to_owned());
    }

    fn confirm(&self, message: &str) -> bool {
      self.confirms.lock().unwrap().push(message.to_owned());
      !self.decline
    }
  }
}
