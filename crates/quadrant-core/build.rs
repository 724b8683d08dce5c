//! Generates the tonic client and server stubs for the calculator, greet and
//! blog services.
//!
//! The services are described in Rust with `tonic_build::manual`, so no
//! `protoc` is needed at build time. Message types live in
//! `src/common/messages.rs` and are encoded with the prost codec, which keeps
//! the wire format identical to a `.proto`-compiled service.
//!
//! Each service is emitted to `$OUT_DIR/<package>.<Service>.rs` and pulled in
//! by `crate::proto`.
use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic_prost::ProstCodec";

#[derive(Clone, Copy)]
enum Shape {
    Unary,
    ServerStreaming,
    ClientStreaming,
    Bidi,
}

fn method(name: &str, route: &str, shape: Shape, input: &str, output: &str) -> Method {
    let builder = Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::proto::{input}"))
        .output_type(format!("crate::proto::{output}"))
        .codec_path(CODEC);

    match shape {
        Shape::Unary => builder,
        Shape::ServerStreaming => builder.server_streaming(),
        Shape::ClientStreaming => builder.client_streaming(),
        Shape::Bidi => builder.client_streaming().server_streaming(),
    }
    .build()
}

fn main() {
    let calculator = Service::builder()
        .name("CalculatorService")
        .package("calculator")
        .comment(" Arithmetic over the four call shapes.")
        .method(method("sum", "Sum", Shape::Unary, "SumRequest", "SumResponse"))
        .method(method(
            "square_root",
            "SquareRoot",
            Shape::Unary,
            "SquareRootRequest",
            "SquareRootResponse",
        ))
        .method(method(
            "prime_decompose",
            "PrimeDecompose",
            Shape::ServerStreaming,
            "PrimeDecompositionRequest",
            "PrimeDecompositionResponse",
        ))
        .method(method(
            "compute_average",
            "ComputeAverage",
            Shape::ClientStreaming,
            "ComputeAverageRequest",
            "ComputeAverageResponse",
        ))
        .method(method(
            "find_maximum",
            "FindMaximum",
            Shape::Bidi,
            "FindMaximumRequest",
            "FindMaximumResponse",
        ))
        .build();

    let greet = Service::builder()
        .name("GreetService")
        .package("greet")
        .comment(" Greetings over the four call shapes, plus a deadline-bound unary call.")
        .method(method("greet", "Greet", Shape::Unary, "GreetRequest", "GreetResponse"))
        .method(method(
            "greet_many_times",
            "GreetManyTimes",
            Shape::ServerStreaming,
            "GreetManyTimesRequest",
            "GreetManyTimesResponse",
        ))
        .method(method(
            "long_greet",
            "LongGreet",
            Shape::ClientStreaming,
            "LongGreetRequest",
            "LongGreetResponse",
        ))
        .method(method(
            "greet_everyone",
            "GreetEveryone",
            Shape::Bidi,
            "GreetEveryoneRequest",
            "GreetEveryoneResponse",
        ))
        .method(method(
            "greet_with_deadline",
            "GreetWithDeadline",
            Shape::Unary,
            "GreetWithDeadlineRequest",
            "GreetWithDeadlineResponse",
        ))
        .build();

    let blog = Service::builder()
        .name("BlogService")
        .package("blog")
        .comment(" CRUD over a key-document store.")
        .method(method(
            "create_blog",
            "CreateBlog",
            Shape::Unary,
            "CreateBlogRequest",
            "CreateBlogResponse",
        ))
        .method(method(
            "read_blog",
            "ReadBlog",
            Shape::Unary,
            "ReadBlogRequest",
            "ReadBlogResponse",
        ))
        .method(method(
            "update_blog",
            "UpdateBlog",
            Shape::Unary,
            "UpdateBlogRequest",
            "UpdateBlogResponse",
        ))
        .method(method(
            "delete_blog",
            "DeleteBlog",
            Shape::Unary,
            "DeleteBlogRequest",
            "DeleteBlogResponse",
        ))
        .method(method(
            "list_blog",
            "ListBlog",
            Shape::ServerStreaming,
            "ListBlogRequest",
            "ListBlogResponse",
        ))
        .build();

    println!("cargo:rerun-if-changed=build.rs");
    Builder::new().compile(&[calculator, greet, blog]);
}
