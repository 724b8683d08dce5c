//! Greeting service. Every reply is built from the greeting's first name.

use crate::server::{
    config::GreetSettings,
    dispatch::{Dispatcher, Method, ResponseStream},
};
use quadrant_core::{
    CallContext, Fault,
    proto::{
        GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest,
        GreetManyTimesResponse, GreetRequest, GreetResponse, GreetWithDeadlineRequest,
        GreetWithDeadlineResponse, Greeting, LongGreetRequest, LongGreetResponse,
        greet_service_server::GreetService,
    },
    stream::{Inbound, Outbound},
};
use tonic::{Request, Response, Status, Streaming};

#[derive(Clone)]
pub struct GreetHandler {
    dispatcher: Dispatcher,
    settings: GreetSettings,
}

impl GreetHandler {
    pub fn new(dispatcher: Dispatcher, settings: GreetSettings) -> Self {
        Self {
            dispatcher,
            settings,
        }
    }
}

#[tonic::async_trait]
impl GreetService for GreetHandler {
    type GreetManyTimesStream = ResponseStream<GreetManyTimesResponse>;
    type GreetEveryoneStream = ResponseStream<GreetEveryoneResponse>;

    async fn greet(
        &self,
        request: Request<GreetRequest>,
    ) -> Result<Response<GreetResponse>, Status> {
        self.dispatcher
            .unary(Method::Greet, request, |_ctx, req| async move { greet(req) })
            .await
    }

    async fn greet_many_times(
        &self,
        request: Request<GreetManyTimesRequest>,
    ) -> Result<Response<Self::GreetManyTimesStream>, Status> {
        let settings = self.settings;
        self.dispatcher
            .server_streaming(Method::GreetManyTimes, request, move |ctx, req, out| {
                greet_many_times(ctx, req, out, settings)
            })
    }

    async fn long_greet(
        &self,
        request: Request<Streaming<LongGreetRequest>>,
    ) -> Result<Response<LongGreetResponse>, Status> {
        self.dispatcher
            .client_streaming(Method::LongGreet, request, long_greet)
            .await
    }

    async fn greet_everyone(
        &self,
        request: Request<Streaming<GreetEveryoneRequest>>,
    ) -> Result<Response<Self::GreetEveryoneStream>, Status> {
        self.dispatcher
            .bidi(Method::GreetEveryone, request, greet_everyone)
    }

    async fn greet_with_deadline(
        &self,
        request: Request<GreetWithDeadlineRequest>,
    ) -> Result<Response<GreetWithDeadlineResponse>, Status> {
        let settings = self.settings;
        self.dispatcher
            .unary(Method::GreetWithDeadline, request, move |ctx, req| {
                greet_with_deadline(ctx, req, settings)
            })
            .await
    }
}

fn first_name(greeting: Option<Greeting>) -> quadrant_core::Result<String> {
    greeting
        .map(|greeting| greeting.first_name)
        .ok_or_else(|| Fault::invalid_argument("request carries no greeting"))
}

pub fn greet(req: GreetRequest) -> quadrant_core::Result<GreetResponse> {
    let first = first_name(req.greeting)?;
    Ok(GreetResponse {
        result: format!("Hello {first}"),
    })
}

/// Sends `settings.many_times_count` numbered greetings, waiting
/// `settings.many_times_interval` between two of them.
pub async fn greet_many_times(
    ctx: CallContext,
    req: GreetManyTimesRequest,
    out: Outbound<GreetManyTimesResponse>,
    settings: GreetSettings,
) -> quadrant_core::Result<()> {
    let first = first_name(req.greeting)?;
    for i in 0..settings.many_times_count {
        if i > 0 {
            ctx.sleep(settings.many_times_interval).await?;
        }
        out.send(GreetManyTimesResponse {
            result: format!("Hello {first} number {i}"),
        })
        .await?;
    }
    Ok(())
}

pub async fn long_greet(
    _ctx: CallContext,
    mut inbound: Inbound<LongGreetRequest>,
) -> quadrant_core::Result<LongGreetResponse> {
    let mut result = String::new();
    while let Some(req) = inbound.recv().await? {
        let first = first_name(req.greeting)?;
        result.push_str(&format!("Hello {first}! "));
    }
    Ok(LongGreetResponse { result })
}

/// Answers each inbound greeting as soon as it arrives.
pub async fn greet_everyone(
    _ctx: CallContext,
    mut inbound: Inbound<GreetEveryoneRequest>,
    out: Outbound<GreetEveryoneResponse>,
) -> quadrant_core::Result<()> {
    while let Some(req) = inbound.recv().await? {
        let first = first_name(req.greeting)?;
        out.send(GreetEveryoneResponse {
            result: format!("Hello {first}! "),
        })
        .await?;
    }
    Ok(())
}

/// Simulates slow work of `deadline_steps` pauses before answering. A caller
/// whose deadline is shorter than the total gets `DeadlineExceeded`; one that
/// cancels gets `Cancelled`.
pub async fn greet_with_deadline(
    ctx: CallContext,
    req: GreetWithDeadlineRequest,
    settings: GreetSettings,
) -> quadrant_core::Result<GreetWithDeadlineResponse> {
    let first = first_name(req.greeting)?;
    for _ in 0..settings.deadline_steps {
        ctx.check()?;
        ctx.sleep(settings.deadline_step).await?;
    }
    Ok(GreetWithDeadlineResponse {
        result: format!("Hello {first}"),
    })
}
