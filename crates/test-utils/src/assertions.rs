// Path: crates/test-utils/src/assertions.rs
//! Small assertion macros to cut down on boilerplate in test modules.

/// Asserts a `Result` is `Ok` and returns the contained value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => panic!("expected Ok, got Err: {:?}", err),
        }
    };
}

/// Asserts a `Result` is `Err` and returns the contained error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(val) => panic!("expected Err, got Ok: {:?}", val),
            Err(err) => err,
        }
    };
}
