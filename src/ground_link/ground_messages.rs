#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Downstream {
    #[prost(oneof = "DownstreamContent", tags = "1, 2, 3, 4, 5")]
    pub content: Option<DownstreamContent>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum DownstreamContent {
    #[prost(message, tag = "1")]
    Pong(Pong),
    #[prost(message, tag = "2")]
    Message(TextMessage),
    #[prost(message, tag = "3")]
    Data(Data),
    #[prost(message, tag = "4")]
    FileMetadata(FileMetadata),
    #[prost(message, tag = "5")]
    FileChunk(FileChunk),
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Pong {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TextMessage {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(string, tag = "2")]
    pub text: String,
    #[prost(bool, tag = "3")]
    pub error: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Data {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(string, tag = "2")]
    pub subsystem: String,
    #[prost(string, tag = "3")]
    pub label: String,
    /// JSON encoded payload.
    #[prost(string, tag = "4")]
    pub json: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileMetadata {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint64, tag = "2")]
    pub size: u64,
    #[prost(uint32, tag = "3")]
    pub chunks: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileChunk {
    #[prost(uint32, tag = "1")]
    pub index: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}
