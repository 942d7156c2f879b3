//! Utilities for terminal output during scanning.

/// Prints a red `[!]` line unless greppable output is requested.
#[macro_export]
macro_rules! warning {
    ($name:expr) => {
        println!("{} {}", colored::Colorize::bold(colored::Colorize::red("[!]")), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("{}", $name);
            } else {
                println!("{} {}", colored::Colorize::bold(colored::Colorize::red("[!]")), $name);
            }
        }
    };
}

#[macro_export]
macro_rules! detail {
    ($name:expr) => {
        println!("{} {}", colored::Colorize::bold(colored::Colorize::blue("[~]")), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("{}", $name);
            } else {
                println!("{} {}", colored::Colorize::bold(colored::Colorize::blue("[~]")), $name);
            }
        }
    };
}

#[macro_export]
macro_rules! output {
    ($name:expr) => {
        println!("{} {}", colored::Colorize::bold(colored::Colorize::green("[>]")), $name);
    };
    ($name:expr, $greppable:expr, $accessible:expr) => {
        if !$greppable {
            if $accessible {
                println!("{}", $name);
            } else {
                println!("{} {}", colored::Colorize::bold(colored::Colorize::green("[>]")), $name);
            }
        }
    };
}
