pub mod figment;
pub mod sensitive;
pub mod time;
pub mod validator;

pub use self::sensitive::Sensitive;
pub use self::time::{format_timestamp, Clock, FixedClock, SystemClock};
