use {crate::prelude::*, colored::ColoredString};

/// Print a grey colored line to separate sections
pub(crate) fn separator() -> ColoredString {
    "\n-=-=-=-=-=-=-=-\n".truecolor(100, 100, 100)
}

/// Notify the operator that a command finished.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        println!(
            "{check} {message}",
            check = "✔".green().bold(),
            message = format!($($arg)*)
        );
    };
}
