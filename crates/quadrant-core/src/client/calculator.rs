use super::{request, server_streaming, unary};
use crate::{
    CallContext, Fault, Result,
    coordinator::{CallSummary, StreamCoordinator},
    proto::{
        ComputeAverageRequest, FindMaximumRequest, PrimeDecompositionRequest, SquareRootRequest,
        SumRequest, calculator_service_client::CalculatorServiceClient,
    },
};
use futures::{Stream, StreamExt, TryStreamExt, future, stream};
use tonic::transport::Channel;

pub type Client = CalculatorServiceClient<Channel>;

/// # Errors
///
/// `InvalidArgument` if the sum overflows.
pub async fn sum(client: &mut Client, ctx: &CallContext, first: i64, last: i64) -> Result<i64> {
    let req = request(
        ctx,
        SumRequest {
            first_number: first,
            last_number: last,
        },
    )?;
    Ok(unary(ctx, client.sum(req)).await?.result)
}

/// # Errors
///
/// `InvalidArgument` for a negative (or NaN) input.
pub async fn square_root(client: &mut Client, ctx: &CallContext, number: f64) -> Result<f64> {
    let req = request(ctx, SquareRootRequest { number })?;
    Ok(unary(ctx, client.square_root(req)).await?.number_root)
}

/// Collects the prime factors of `number` in the order the server finds them.
///
/// # Errors
///
/// `InvalidArgument` for inputs below 1.
pub async fn prime_decompose(
    client: &mut Client,
    ctx: &CallContext,
    number: i64,
) -> Result<Vec<i64>> {
    let req = request(ctx, PrimeDecompositionRequest { number })?;
    let mut factors = Vec::new();
    server_streaming(ctx, client.prime_decompose(req), |factor| {
        factors.push(factor.result);
        Ok(())
    })
    .await?;
    Ok(factors)
}

/// Streams `numbers` and returns their mean.
///
/// # Errors
///
/// `InvalidArgument` if `numbers` is empty.
pub async fn compute_average<S>(
    client: &Client,
    coordinator: &StreamCoordinator,
    numbers: S,
) -> Result<f64>
where
    S: Stream<Item = f64>,
{
    let ctx = coordinator.context().clone();
    let mut client = client.clone();

    let responses = coordinator
        .collect(
            numbers.map(|number| ComputeAverageRequest { number }),
            move |outbound| async move {
                let req = request(&ctx, outbound)?;
                let response = client
                    .compute_average(req)
                    .await
                    .map_err(Fault::from)?
                    .into_inner();
                Ok::<_, Fault>(stream::once(future::ready(Ok::<_, Fault>(response))))
            },
        )
        .await?;

    responses
        .first()
        .map(|response| response.result)
        .ok_or_else(|| Fault::internal("ComputeAverage ended without a response"))
}

/// Streams `numbers` and reports every new running maximum to `on_max` as it
/// arrives.
pub async fn find_maximum<S, F>(
    client: &Client,
    coordinator: &StreamCoordinator,
    numbers: S,
    mut on_max: F,
) -> Result<CallSummary>
where
    S: Stream<Item = i64>,
    F: FnMut(i64),
{
    let ctx = coordinator.context().clone();
    let mut client = client.clone();

    coordinator
        .run(
            numbers.map(|number| FindMaximumRequest { number }),
            move |outbound| async move {
                let req = request(&ctx, outbound)?;
                let responses = client
                    .find_maximum(req)
                    .await
                    .map_err(Fault::from)?
                    .into_inner();
                Ok::<_, Fault>(responses.map_err(Fault::from))
            },
            |response| {
                on_max(response.result);
                Ok(())
            },
        )
        .await
}
