pub mod request_id;

pub use request_id::{
    caller_middleware, make_span_with_request_id, request_id_middleware, Caller, RequestId,
    REQUEST_ID_HEADER, USER_ID_HEADER,
};
