/// Raise a soft fault on the process-wide handler with a formatted message.
#[macro_export]
macro_rules! soft_fault {
    ($($arg:tt)+) => {
        $crate::soft_fault(::std::format!($($arg)+))
    };
}

/// Raise a soft fault unless `cond` holds.
#[macro_export]
macro_rules! soft_check {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::soft_fault(::std::concat!("check failed: ", ::std::stringify!($cond)))
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::soft_fault(::std::format!($($arg)+))
        }
    };
}

/// Abort the process through the process-wide handler.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {
        $crate::fatal(::std::format!($($arg)+))
    };
}
