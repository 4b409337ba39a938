pub mod protocol;

pub use protocol::{
    decode_command, decode_get_response, decode_set_response, encode_command,
    encode_get_response, encode_set_response, Command, Status,
};
