//! # Message Envelopes
//!
//! Every request and response exchanged by the calculator, greet and blog
//! services. The structs are plain prost messages, so the bytes on the wire
//! match what a `.proto`-compiled peer expects for the same field tags.
//!
//! An envelope is immutable once handed to a stream: senders move it into
//! [`Outbound::send`](crate::stream::Outbound::send) and receivers take
//! ownership from [`Inbound::recv`](crate::stream::Inbound::recv). Its position
//! on the stream is implicit in delivery order.

// ---------------------------------------------------------------------------
// calculator
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SumRequest {
    #[prost(int64, tag = "1")]
    pub first_number: i64,
    #[prost(int64, tag = "2")]
    pub last_number: i64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SumResponse {
    #[prost(int64, tag = "1")]
    pub result: i64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SquareRootRequest {
    /// May be negative, in which case the call faults with `InvalidArgument`.
    #[prost(double, tag = "1")]
    pub number: f64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SquareRootResponse {
    #[prost(double, tag = "1")]
    pub number_root: f64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct PrimeDecompositionRequest {
    #[prost(int64, tag = "1")]
    pub number: i64,
}

/// One prime factor. Factors arrive in non-decreasing order.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct PrimeDecompositionResponse {
    #[prost(int64, tag = "1")]
    pub result: i64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ComputeAverageRequest {
    #[prost(double, tag = "1")]
    pub number: f64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ComputeAverageResponse {
    #[prost(double, tag = "1")]
    pub result: f64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct FindMaximumRequest {
    #[prost(int64, tag = "1")]
    pub number: i64,
}

/// A new running maximum. Only sent when the maximum strictly increases.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct FindMaximumResponse {
    #[prost(int64, tag = "1")]
    pub result: i64,
}

// ---------------------------------------------------------------------------
// greet
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Greeting {
    #[prost(string, tag = "1")]
    pub first_name: String,
    #[prost(string, tag = "2")]
    pub last_name: String,
}

impl Greeting {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

macro_rules! greeting_envelopes {
    ($($req:ident => $resp:ident),* $(,)?) => {
        $(
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct $req {
                #[prost(message, optional, tag = "1")]
                pub greeting: Option<Greeting>,
            }

            impl From<Greeting> for $req {
                fn from(greeting: Greeting) -> Self {
                    Self { greeting: Some(greeting) }
                }
            }

            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct $resp {
                #[prost(string, tag = "1")]
                pub result: String,
            }
        )*
    };
}

greeting_envelopes! {
    GreetRequest => GreetResponse,
    GreetManyTimesRequest => GreetManyTimesResponse,
    LongGreetRequest => LongGreetResponse,
    GreetEveryoneRequest => GreetEveryoneResponse,
    GreetWithDeadlineRequest => GreetWithDeadlineResponse,
}

// ---------------------------------------------------------------------------
// blog
// ---------------------------------------------------------------------------

/// A stored document. `id` is assigned by the store and opaque to callers.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Blog {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub author_id: String,
    #[prost(string, tag = "3")]
    pub title: String,
    #[prost(string, tag = "4")]
    pub content: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateBlogRequest {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadBlogRequest {
    #[prost(string, tag = "1")]
    pub blog_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

/// Replaces the fields of the document whose id is `blog.id`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateBlogRequest {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteBlogRequest {
    #[prost(string, tag = "1")]
    pub blog_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteBlogResponse {
    #[prost(string, tag = "1")]
    pub blog_id: String,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ListBlogRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}
