/// A macro for building [`AnyErr`](crate::errors::AnyErr) reports from a message, with optional formatting.
#[macro_export]
macro_rules! anyerr {
    () => {{
        error_stack::Report::new($crate::errors::AnyErr)
    }};

    ($str:expr) => {{
        error_stack::Report::new($crate::errors::AnyErr).attach_printable($str)
    }};

    ($str:expr, $($arg:expr),*) => {{
        error_stack::Report::new($crate::errors::AnyErr).attach_printable(format!($str, $($arg),*))
    }};
}
