//! Accessor macros over `serde_cbor::Value` used when inspecting COSE keys
//! and authenticator extension outputs.

macro_rules! cbor_try_map {
    ($v:expr) => {{
        match $v {
            serde_cbor::Value::Map(m) => Ok(m),
            _ => Err($crate::error::WebauthnError::ConstraintViolation(
                "cbor value is not a map",
            )),
        }
    }};
}

macro_rules! cbor_try_array {
    ($v:expr) => {{
        match $v {
            serde_cbor::Value::Array(a) => Ok(a),
            _ => Err($crate::error::WebauthnError::ConstraintViolation(
                "cbor value is not an array",
            )),
        }
    }};
}

macro_rules! cbor_try_bytes {
    ($v:expr) => {{
        match $v {
            serde_cbor::Value::Bytes(b) => Ok(b),
            _ => Err($crate::error::WebauthnError::ConstraintViolation(
                "cbor value is not bytes",
            )),
        }
    }};
}

macro_rules! cbor_try_bool {
    ($v:expr) => {{
        match $v {
            serde_cbor::Value::Bool(b) => Ok(*b),
            _ => Err($crate::error::WebauthnError::ConstraintViolation(
                "cbor value is not a bool",
            )),
        }
    }};
}

macro_rules! cbor_try_i128 {
    ($v:expr) => {{
        match $v {
            serde_cbor::Value::Integer(i) => Ok(*i),
            _ => Err($crate::error::WebauthnError::ConstraintViolation(
                "cbor value is not an integer",
            )),
        }
    }};
}
