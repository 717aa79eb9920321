mod any;
mod macros;

pub use any::AnyErr;

pub(crate) mod prelude {
    pub use error_stack::{Report, Result, ResultExt};

    pub use super::any::AnyErr;
    #[allow(unused_imports)]
    pub use crate::anyerr;
}
