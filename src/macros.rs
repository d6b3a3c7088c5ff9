#[cfg(not(feature = "no_logging"))]
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {{
        if let Some(w) = $logger.line_writer() {
            use std::io::Write as _;
            let _ = writeln!(w, $($arg)*);
        }
    }};
}
#[cfg(feature = "no_logging")]
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {{
        let _ = &$logger;
    }};
}

// Compile-time switched trace output. Modules wrap this in a local
// `debug_log!` with their own flag and prefix.
macro_rules! enabled_debug_print {
    (false, $name:literal, $format:literal) => {};
    (false, $name:literal, $format:literal, $($args:expr),*) => {};
    (true, $name:literal, $format:literal) => {
        println!("[{}] {}", $name, $format)
    };
    (true, $name:literal, $format:literal, $($args:expr),*) => {
        println!("[{}] {}", $name, format!($format, $($args),*))
    };
}

// Binds `$t` to the Rust element type backing a numeric `TypeTag` and
// evaluates `$body` with it. Callers check `is_numeric()` first.
macro_rules! dispatch_numeric {
    ($tag:expr, $t:ident => $body:expr) => {
        match $tag {
            crate::value::TypeTag::Byte => { type $t = u8; $body },
            crate::value::TypeTag::Int16 => { type $t = i16; $body },
            crate::value::TypeTag::Int32 => { type $t = i32; $body },
            crate::value::TypeTag::Int64 => { type $t = i64; $body },
            crate::value::TypeTag::Float32 => { type $t = f32; $body },
            crate::value::TypeTag::Float64 => { type $t = f64; $body },
            crate::value::TypeTag::ComplexFloat => { type $t = num_complex::Complex32; $body },
            crate::value::TypeTag::ComplexDouble => { type $t = num_complex::Complex64; $body },
            other => unreachable!("numeric dispatch on {}", other),
        }
    };
}
