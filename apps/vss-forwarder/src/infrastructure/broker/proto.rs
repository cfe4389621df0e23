//! Kuksa `kuksa.val.v1` Protocol Subset
//!
//! Message and client definitions for the part of the Databroker API the
//! relay uses: the server-streaming `VAL/Subscribe` call. Field numbers
//! match `kuksa/val/v1/{types,val}.proto`. Fields the relay never reads
//! (metadata, array values) are left out and skipped by the decoder.

#![allow(missing_docs, clippy::derive_partial_eq_without_eq)]

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeRequest {
    #[prost(message, repeated, tag = "1")]
    pub entries: ::prost::alloc::vec::Vec<SubscribeEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeEntry {
    #[prost(string, tag = "1")]
    pub path: ::prost::alloc::string::String,
    #[prost(enumeration = "View", tag = "2")]
    pub view: i32,
    #[prost(enumeration = "Field", repeated, tag = "3")]
    pub fields: ::prost::alloc::vec::Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeResponse {
    #[prost(message, repeated, tag = "1")]
    pub updates: ::prost::alloc::vec::Vec<EntryUpdate>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntryUpdate {
    #[prost(message, optional, tag = "1")]
    pub entry: ::core::option::Option<DataEntry>,
    #[prost(enumeration = "Field", repeated, tag = "2")]
    pub fields: ::prost::alloc::vec::Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataEntry {
    #[prost(string, tag = "1")]
    pub path: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub value: ::core::option::Option<Datapoint>,
    #[prost(message, optional, tag = "3")]
    pub actuator_target: ::core::option::Option<Datapoint>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Datapoint {
    #[prost(message, optional, tag = "1")]
    pub timestamp: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(oneof = "datapoint::Value", tags = "11, 12, 13, 14, 15, 16, 17, 18")]
    pub value: ::core::option::Option<datapoint::Value>,
}

/// Nested types for `Datapoint`.
pub mod datapoint {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "11")]
        String(::prost::alloc::string::String),
        #[prost(bool, tag = "12")]
        Bool(bool),
        #[prost(sint32, tag = "13")]
        Int32(i32),
        #[prost(sint64, tag = "14")]
        Int64(i64),
        #[prost(uint32, tag = "15")]
        Uint32(u32),
        #[prost(uint64, tag = "16")]
        Uint64(u64),
        #[prost(float, tag = "17")]
        Float(f32),
        #[prost(double, tag = "18")]
        Double(f64),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum View {
    Unspecified = 0,
    CurrentValue = 1,
    TargetValue = 2,
    Metadata = 3,
    Fields = 10,
    All = 20,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Field {
    Unspecified = 0,
    Path = 1,
    Value = 2,
    ActuatorTarget = 3,
    Metadata = 10,
}

/// Client for the `kuksa.val.v1.VAL` service.
pub mod val_client {
    #![allow(
        unused_variables,
        dead_code,
        missing_docs,
        clippy::wildcard_imports,
        clippy::let_unit_value
    )]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct ValClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> ValClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::Body>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        /// Limits the maximum size of a decoded message.
        ///
        /// Default: `4MB`
        #[must_use]
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        pub async fn subscribe(
            &mut self,
            request: impl tonic::IntoRequest<super::SubscribeRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::SubscribeResponse>>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic_prost::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/kuksa.val.v1.VAL/Subscribe");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("kuksa.val.v1.VAL", "Subscribe"));
            self.inner.server_streaming(req, path, codec).await
        }
    }
}
