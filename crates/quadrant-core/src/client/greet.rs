use super::{request, server_streaming, unary};
use crate::{
    CallContext, Fault, Result,
    coordinator::{CallSummary, StreamCoordinator},
    proto::{
        GreetEveryoneRequest, GreetManyTimesRequest, GreetRequest, GreetWithDeadlineRequest,
        Greeting, LongGreetRequest, greet_service_client::GreetServiceClient,
    },
};
use futures::{Stream, StreamExt, TryStreamExt, future, stream};
use tonic::transport::Channel;

pub type Client = GreetServiceClient<Channel>;

pub async fn greet(client: &mut Client, ctx: &CallContext, greeting: Greeting) -> Result<String> {
    let req = request(ctx, GreetRequest::from(greeting))?;
    Ok(unary(ctx, client.greet(req)).await?.result)
}

/// Receives the server's greetings one by one, returning how many arrived.
pub async fn greet_many_times<F>(
    client: &mut Client,
    ctx: &CallContext,
    greeting: Greeting,
    mut on_greeting: F,
) -> Result<u64>
where
    F: FnMut(String),
{
    let req = request(ctx, GreetManyTimesRequest::from(greeting))?;
    server_streaming(ctx, client.greet_many_times(req), |response| {
        on_greeting(response.result);
        Ok(())
    })
    .await
}

/// Streams `greetings` and returns the server's combined answer.
pub async fn long_greet<S>(
    client: &Client,
    coordinator: &StreamCoordinator,
    greetings: S,
) -> Result<String>
where
    S: Stream<Item = Greeting>,
{
    let ctx = coordinator.context().clone();
    let mut client = client.clone();

    let mut responses = coordinator
        .collect(
            greetings.map(LongGreetRequest::from),
            move |outbound| async move {
                let req = request(&ctx, outbound)?;
                let response = client
                    .long_greet(req)
                    .await
                    .map_err(Fault::from)?
                    .into_inner();
                Ok::<_, Fault>(stream::once(future::ready(Ok::<_, Fault>(response))))
            },
        )
        .await?;

    responses
        .pop()
        .map(|response| response.result)
        .ok_or_else(|| Fault::internal("LongGreet ended without a response"))
}

/// Streams `greetings`, passing each reply to `on_reply` while sending
/// continues.
pub async fn greet_everyone<S, F>(
    client: &Client,
    coordinator: &StreamCoordinator,
    greetings: S,
    mut on_reply: F,
) -> Result<CallSummary>
where
    S: Stream<Item = Greeting>,
    F: FnMut(String),
{
    let ctx = coordinator.context().clone();
    let mut client = client.clone();

    coordinator
        .run(
            greetings.map(GreetEveryoneRequest::from),
            move |outbound| async move {
                let req = request(&ctx, outbound)?;
                let responses = client
                    .greet_everyone(req)
                    .await
                    .map_err(Fault::from)?
                    .into_inner();
                Ok::<_, Fault>(responses.map_err(Fault::from))
            },
            |response| {
                on_reply(response.result);
                Ok(())
            },
        )
        .await
}

/// # Errors
///
/// `DeadlineExceeded` if `ctx`'s deadline passes before the server answers.
pub async fn greet_with_deadline(
    client: &mut Client,
    ctx: &CallContext,
    greeting: Greeting,
) -> Result<String> {
    let req = request(ctx, GreetWithDeadlineRequest::from(greeting))?;
    Ok(unary(ctx, client.greet_with_deadline(req)).await?.result)
}
