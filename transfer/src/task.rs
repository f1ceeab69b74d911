//! Units of work submitted while scheduling transfers, and names for the things they create.

use rand::Rng;
use std::fmt::{self, Debug, Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// A function and its arguments, packaged to be called later.
///
/// The description is used when logging the work, since the function itself is opaque.
pub struct FunctionContainer<T> {
    description: String,
    func: Box<dyn FnOnce() -> T + Send>,
}

impl<T> FunctionContainer<T> {
    pub fn new(description: impl Into<String>, func: impl FnOnce() -> T + Send + 'static) -> Self {
        Self {
            description: description.into(),
            func: Box::new(func),
        }
    }

    /// Call the contained function.
    pub fn call(self) -> T {
        tracing::debug!("calling {self}");
        (self.func)()
    }
}

impl<T> Display for FunctionContainer<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Function: {}", self.description)
    }
}

impl<T> Debug for FunctionContainer<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("FunctionContainer")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Generate a unique ID including `name`, a timestamp, and a random number.
pub fn unique_id(name: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let salt = rand::thread_rng().gen_range(0..=10000);
    format!("{name}-{timestamp}-{salt}")
}

/// The default length of a [`random_file_extension`].
pub const DEFAULT_EXTENSION_DIGITS: usize = 8;

const HEX_DIGITS: &[u8] = b"0123456789abcdefABCDEF";

/// Generate a random extension of `num_digits` hex digits.
///
/// Downloads are written to a temporary file named with such an extension and renamed into place
/// once complete.
pub fn random_file_extension(num_digits: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..num_digits)
        .map(|_| HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())] as char)
        .collect()
}
