pub mod for_codec;
