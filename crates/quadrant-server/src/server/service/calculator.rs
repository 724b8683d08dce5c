//! Arithmetic service: one method per call shape.

use crate::server::dispatch::{Dispatcher, Method, ResponseStream};
use quadrant_core::{
    CallContext, Fault,
    proto::{
        ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
        PrimeDecompositionRequest, PrimeDecompositionResponse, SquareRootRequest,
        SquareRootResponse, SumRequest, SumResponse, calculator_service_server::CalculatorService,
    },
    stream::{Inbound, Outbound},
};
use tonic::{Request, Response, Status, Streaming};

/// Trial divisions between cancellation checks in `prime_decompose`.
const CHECK_EVERY: u64 = 4096;

#[derive(Clone)]
pub struct CalculatorHandler {
    dispatcher: Dispatcher,
}

impl CalculatorHandler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[tonic::async_trait]
impl CalculatorService for CalculatorHandler {
    type PrimeDecomposeStream = ResponseStream<PrimeDecompositionResponse>;
    type FindMaximumStream = ResponseStream<FindMaximumResponse>;

    async fn sum(&self, request: Request<SumRequest>) -> Result<Response<SumResponse>, Status> {
        self.dispatcher
            .unary(Method::Sum, request, |_ctx, req| async move { sum(req) })
            .await
    }

    async fn square_root(
        &self,
        request: Request<SquareRootRequest>,
    ) -> Result<Response<SquareRootResponse>, Status> {
        self.dispatcher
            .unary(Method::SquareRoot, request, |_ctx, req| async move {
                square_root(req)
            })
            .await
    }

    async fn prime_decompose(
        &self,
        request: Request<PrimeDecompositionRequest>,
    ) -> Result<Response<Self::PrimeDecomposeStream>, Status> {
        self.dispatcher
            .server_streaming(Method::PrimeDecompose, request, prime_decompose)
    }

    async fn compute_average(
        &self,
        request: Request<Streaming<ComputeAverageRequest>>,
    ) -> Result<Response<ComputeAverageResponse>, Status> {
        self.dispatcher
            .client_streaming(Method::ComputeAverage, request, compute_average)
            .await
    }

    async fn find_maximum(
        &self,
        request: Request<Streaming<FindMaximumRequest>>,
    ) -> Result<Response<Self::FindMaximumStream>, Status> {
        self.dispatcher
            .bidi(Method::FindMaximum, request, find_maximum)
    }
}

pub fn sum(req: SumRequest) -> quadrant_core::Result<SumResponse> {
    let SumRequest {
        first_number,
        last_number,
    } = req;
    first_number
        .checked_add(last_number)
        .map(|result| SumResponse { result })
        .ok_or_else(|| {
            Fault::invalid_argument(format!(
                "{first_number} + {last_number} does not fit in 64 bits"
            ))
        })
}

pub fn square_root(req: SquareRootRequest) -> quadrant_core::Result<SquareRootResponse> {
    let number = req.number;
    if number.is_nan() {
        return Err(Fault::invalid_argument("received NaN"));
    }
    if number < 0.0 {
        return Err(Fault::invalid_argument(format!(
            "received a negative number {number}"
        )));
    }
    Ok(SquareRootResponse {
        number_root: number.sqrt(),
    })
}

/// Streams the prime factors of `req.number` in non-decreasing order. Zero
/// and one have no prime factors and close the stream without sending.
///
/// Trial division stops once the divisor squared exceeds what is left, so the
/// remaining cofactor (if above one) is itself prime and is sent last.
pub async fn prime_decompose(
    ctx: CallContext,
    req: PrimeDecompositionRequest,
    out: Outbound<PrimeDecompositionResponse>,
) -> quadrant_core::Result<()> {
    let mut n = req.number;
    if n < 0 {
        return Err(Fault::invalid_argument(format!(
            "cannot decompose {n}: expected a non-negative integer"
        )));
    }

    let mut divisor: i64 = 2;
    let mut attempts: u64 = 0;
    while n > 1 {
        if divisor.checked_mul(divisor).is_none_or(|square| square > n) {
            out.send(PrimeDecompositionResponse { result: n }).await?;
            break;
        }

        if n % divisor == 0 {
            out.send(PrimeDecompositionResponse { result: divisor })
                .await?;
            n /= divisor;
        } else {
            divisor += 1;
            attempts += 1;
            if attempts.is_multiple_of(CHECK_EVERY) {
                ctx.check()?;
                tokio::task::yield_now().await;
            }
        }
    }

    Ok(())
}

pub async fn compute_average(
    _ctx: CallContext,
    mut inbound: Inbound<ComputeAverageRequest>,
) -> quadrant_core::Result<ComputeAverageResponse> {
    let mut total = 0.0;
    let mut count: u64 = 0;
    while let Some(ComputeAverageRequest { number }) = inbound.recv().await? {
        total += number;
        count += 1;
    }

    if count == 0 {
        return Err(Fault::invalid_argument(
            "cannot average an empty stream of numbers",
        ));
    }
    Ok(ComputeAverageResponse {
        result: total / count as f64,
    })
}

/// Emits the running maximum each time it strictly increases.
pub async fn find_maximum(
    _ctx: CallContext,
    mut inbound: Inbound<FindMaximumRequest>,
    out: Outbound<FindMaximumResponse>,
) -> quadrant_core::Result<()> {
    let mut maximum: Option<i64> = None;
    while let Some(FindMaximumRequest { number }) = inbound.recv().await? {
        if maximum.is_none_or(|current| number > current) {
            maximum = Some(number);
            out.send(FindMaximumResponse { result: number }).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use futures::{StreamExt, stream};
    use quadrant_core::stream::channel;

    async fn factors(number: i64) -> quadrant_core::Result<Vec<i64>> {
        let ctx = CallContext::new();
        let (out, rx) = channel(&ctx, 64);
        let producer = prime_decompose(ctx, PrimeDecompositionRequest { number }, out);
        let (outcome, items) = tokio::join!(producer, rx.collect::<Vec<_>>());
        outcome?;
        Ok(items.into_iter().map(|item| item.unwrap().result).collect())
    }

    async fn maxima(numbers: &[i64]) -> Vec<i64> {
        let ctx = CallContext::new();
        let requests: Vec<_> = numbers
            .iter()
            .map(|&number| Ok(FindMaximumRequest { number }))
            .collect();
        let inbound = Inbound::new(stream::iter(requests), ctx.clone());
        let (out, rx) = channel(&ctx, 64);

        find_maximum(ctx, inbound, out).await.unwrap();
        rx.map(|item| item.unwrap().result).collect().await
    }

    #[test]
    fn sum_adds_and_rejects_overflow() {
        let res = sum(SumRequest {
            first_number: 3,
            last_number: 10,
        });
        assert_eq!(res, Ok(SumResponse { result: 13 }));

        let res = sum(SumRequest {
            first_number: i64::MAX,
            last_number: 1,
        });
        assert!(matches!(res, Err(Fault::InvalidArgument { .. })));
    }

    #[test]
    fn square_root_of_negative_is_invalid() {
        assert_eq!(
            square_root(SquareRootRequest { number: 16.0 }),
            Ok(SquareRootResponse { number_root: 4.0 })
        );
        assert_eq!(
            square_root(SquareRootRequest { number: -10.0 }),
            Err(Fault::invalid_argument("received a negative number -10"))
        );
        assert!(square_root(SquareRootRequest { number: f64::NAN }).is_err());
    }

    #[tokio::test]
    async fn decomposes_into_ordered_primes() {
        assert_eq!(factors(120).await.unwrap(), vec![2, 2, 2, 3, 5]);
        assert_eq!(factors(97).await.unwrap(), vec![97]);
        assert_eq!(factors(1).await.unwrap(), Vec::<i64>::new());
        assert_eq!(factors(0).await.unwrap(), Vec::<i64>::new());
        assert_eq!(
            factors(1_000_000_007).await.unwrap(),
            vec![1_000_000_007]
        );
    }

    #[tokio::test]
    async fn factors_multiply_back_to_input() {
        for n in 2..=500_i64 {
            let primes = factors(n).await.unwrap();
            assert_eq!(primes.iter().product::<i64>(), n);
            assert!(primes.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }

    #[tokio::test]
    async fn negative_inputs_are_rejected() {
        for n in [-1, -120, i64::MIN] {
            assert!(matches!(
                factors(n).await,
                Err(Fault::InvalidArgument { .. })
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unread_factors_stop_at_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(100));
        let (out, _rx) = channel(&ctx, 1);

        let res = prime_decompose(ctx, PrimeDecompositionRequest { number: 1 << 40 }, out).await;
        assert_eq!(res, Err(Fault::DeadlineExceeded));
    }

    #[tokio::test]
    async fn averages_the_stream() {
        let ctx = CallContext::new();
        let numbers = [1.0, 2.0, 3.0, 4.0].map(|number| Ok(ComputeAverageRequest { number }));
        let inbound = Inbound::new(stream::iter(numbers), ctx.clone());

        let response = compute_average(ctx, inbound).await.unwrap();
        assert_eq!(response.result, 2.5);
    }

    #[tokio::test]
    async fn empty_average_is_invalid() {
        let ctx = CallContext::new();
        let inbound = Inbound::new(stream::empty(), ctx.clone());
        assert!(matches!(
            compute_average(ctx, inbound).await,
            Err(Fault::InvalidArgument { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_numbers_end_average_at_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(150));
        let numbers = stream::iter([Ok(ComputeAverageRequest { number: 8.0 })])
            .chain(stream::pending());
        let inbound = Inbound::new(numbers, ctx.clone());

        assert_eq!(
            compute_average(ctx, inbound).await,
            Err(Fault::DeadlineExceeded)
        );
    }

    #[tokio::test]
    async fn emits_strictly_increasing_maxima() {
        assert_eq!(maxima(&[1, 5, 3, 6, 2, 20]).await, vec![1, 5, 6, 20]);
        assert_eq!(maxima(&[4, 4, 4]).await, vec![4]);
        assert_eq!(maxima(&[-5, -7, -1]).await, vec![-5, -1]);
        assert_eq!(maxima(&[]).await, Vec::<i64>::new());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sender_hits_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(200));
        let inbound = Inbound::new(stream::pending(), ctx.clone());
        let (out, _rx) = channel(&ctx, 4);

        assert_eq!(
            find_maximum(ctx, inbound, out).await,
            Err(Fault::DeadlineExceeded)
        );
    }
}
