//! # Pipeline Guarantees
//!
//! Tests the caller-visible guarantees of `PipelineManager`:
//!
//! 1. N submits followed by a drain yield exactly N unique tokens
//! 2. Submit never waits, however many requests are outstanding
//! 3. A token is collected at most once
//! 4. Collecting A never waits on B
//! 5. Pipelining pays the round trip once, interleaving pays it N times
//! 6. The outstanding cap rejects the (cap+1)-th submit without a token
//! 7. Cancelling shutdown fails every waiter with `Cancelled`
//!
//! Timing tests run with paused tokio time, so latencies are virtual.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use rand::seq::SliceRandom;
    use tokio::time::Instant;

    use pipeline_core::{
        Atom, AtomReply, AtomRequest, AtomTable, LatencyModel, LoopbackTransport, PipelineApi,
        PipelineConfig, PipelineError, PipelineManager, ReplyOrdering, ShutdownPolicy,
        SimulatedTransport, Token,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    type Loopback = LoopbackTransport<AtomRequest, AtomReply>;

    const LATENCY: Duration = Duration::from_millis(1);

    fn loopback(
        ordering: ReplyOrdering,
        config: PipelineConfig,
    ) -> (Arc<Loopback>, PipelineManager<Loopback>) {
        let transport = Arc::new(LoopbackTransport::new(ordering));
        let pipeline = PipelineManager::new(transport.clone(), config).unwrap();
        (transport, pipeline)
    }

    fn simulated(
        latency: LatencyModel,
        ordering: ReplyOrdering,
    ) -> PipelineManager<SimulatedTransport<AtomTable>> {
        let transport = Arc::new(SimulatedTransport::new(
            Arc::new(AtomTable::new()),
            latency,
            ordering,
        ));
        PipelineManager::new(transport, PipelineConfig::unbounded()).unwrap()
    }

    fn atom(n: u32) -> AtomReply {
        AtomReply::Atom(Atom(n))
    }

    // =============================================================================
    // 1. SUBMIT THEN DRAIN
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_drain_returns_every_submitted_token_once() {
        for ordering in [ReplyOrdering::Fifo, ReplyOrdering::Tagged] {
            let pipeline = simulated(
                LatencyModel::Jittered {
                    base: LATENCY,
                    jitter: Duration::from_millis(4),
                },
                ordering,
            );

            let names = pipeline_core::numbered_names(300);
            let submitted: Vec<Token> = names
                .iter()
                .map(|n| pipeline.submit(AtomRequest::intern(n.as_str())).unwrap())
                .collect();

            let drained = pipeline.drain().await;
            assert_eq!(drained.len(), 300, "{} ordering", ordering);

            let unique: HashSet<Token> = drained.iter().map(|(t, _)| *t).collect();
            assert_eq!(unique.len(), 300);
            assert_eq!(unique, submitted.iter().copied().collect::<HashSet<_>>());

            let atoms: Vec<u32> = drained
                .iter()
                .map(|(_, reply)| reply.as_ref().unwrap().atom().unwrap().0)
                .collect();
            if ordering == ReplyOrdering::Fifo {
                // Served in issuance order, so NAME{i} is the i-th atom
                assert_eq!(atoms, (69..369).collect::<Vec<u32>>());
            } else {
                let unique: HashSet<u32> = atoms.into_iter().collect();
                assert_eq!(unique, (69..369).collect::<HashSet<u32>>());
            }
            assert_eq!(pipeline.pending_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_drain_routes_shuffled_tagged_replies() {
        let (transport, pipeline) = loopback(ReplyOrdering::Tagged, PipelineConfig::unbounded());
        let tokens: Vec<Token> = (0..100)
            .map(|i| pipeline.submit(AtomRequest::GetName(Atom(i))).unwrap())
            .collect();

        let mut parked = transport.take_requests();
        parked.shuffle(&mut rand::thread_rng());
        for (sequence, request) in parked {
            let AtomRequest::GetName(Atom(n)) = request else {
                panic!("unexpected request {:?}", request);
            };
            transport
                .reply(sequence, AtomReply::Name(format!("N{}", n)))
                .unwrap();
        }

        let drained = pipeline.drain().await;
        assert_eq!(drained.iter().map(|(t, _)| *t).collect::<Vec<_>>(), tokens);
        for (i, (_, reply)) in drained.into_iter().enumerate() {
            assert_eq!(reply.unwrap().name(), Some(format!("N{}", i).as_str()));
        }
    }

    #[tokio::test]
    async fn test_drain_with_nothing_outstanding_is_empty() {
        let (_transport, pipeline) = loopback(ReplyOrdering::Fifo, PipelineConfig::default());
        assert!(pipeline.drain().await.is_empty());
    }

    // =============================================================================
    // 2. SUBMIT NEVER WAITS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_submit_does_not_wait_on_outstanding_requests() {
        // Nobody ever answers, so any wait would hang
        let (transport, pipeline) = loopback(ReplyOrdering::Fifo, PipelineConfig::unbounded());

        let start = Instant::now();
        for i in 0..10_000 {
            pipeline
                .submit(AtomRequest::intern(format!("N{}", i)))
                .unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(transport.parked(), 10_000);
        assert_eq!(pipeline.in_flight(), 10_000);
    }

    #[test]
    fn test_submit_is_callable_from_plain_threads() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let (_transport, pipeline) =
            runtime.block_on(async { loopback(ReplyOrdering::Fifo, PipelineConfig::unbounded()) });
        let pipeline = Arc::new(pipeline);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || {
                    (0..250)
                        .map(|i| {
                            pipeline
                                .submit(AtomRequest::intern(format!("T{}-{}", t, i)))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let tokens = handle.join().unwrap();
            // Per thread, tokens are strictly increasing
            assert!(tokens.windows(2).all(|w| w[0] < w[1]));
            all.extend(tokens);
        }
        assert_eq!(all.len(), 1000);

        drop(pipeline);
        drop(runtime);
    }

    // =============================================================================
    // 3. AT-MOST-ONCE COLLECTION
    // =============================================================================

    #[tokio::test]
    async fn test_second_collect_is_unknown_token() {
        let (transport, pipeline) = loopback(ReplyOrdering::Fifo, PipelineConfig::default());

        let ok = pipeline.submit(AtomRequest::intern("A")).unwrap();
        let bad = pipeline.submit(AtomRequest::intern("")).unwrap();
        let (seq, _) = transport.next_request().unwrap();
        transport.reply(seq, atom(69)).unwrap();
        let (seq, _) = transport.next_request().unwrap();
        transport
            .fail(seq, pipeline_core::RemoteError::new(2, "BadValue"))
            .unwrap();

        assert_eq!(pipeline.collect(ok).await, Ok(atom(69)));
        assert_eq!(
            pipeline.collect(ok).await,
            Err(PipelineError::UnknownToken(ok))
        );

        // A failed outcome is also consumed by its first collect
        assert!(matches!(
            pipeline.collect(bad).await,
            Err(PipelineError::TransportReportedError { .. })
        ));
        let second = pipeline.collect(bad).await.unwrap_err();
        assert_eq!(second, PipelineError::UnknownToken(bad));
        assert!(second.is_caller_bug());
    }

    #[tokio::test]
    async fn test_token_from_another_pipeline_is_unknown() {
        let (transport_a, a) = loopback(ReplyOrdering::Fifo, PipelineConfig::default());
        let (_transport_b, b) = loopback(ReplyOrdering::Fifo, PipelineConfig::default());

        let token = a.submit(AtomRequest::intern("A")).unwrap();
        b.submit(AtomRequest::intern("B")).unwrap();

        assert_eq!(
            b.collect(token).await,
            Err(PipelineError::UnknownToken(token))
        );

        // The foreign lookup did not disturb the owner
        transport_a.reply(pipeline_core::SequenceId(1), atom(69)).unwrap();
        assert_eq!(a.collect(token).await, Ok(atom(69)));
    }

    // =============================================================================
    // 4. NO WAITING ON DISJOINT TOKENS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_collect_a_while_earlier_b_outstanding() {
        let (transport, pipeline) = loopback(ReplyOrdering::Tagged, PipelineConfig::default());

        let b = pipeline.submit(AtomRequest::intern("B")).unwrap();
        let a = pipeline.submit(AtomRequest::intern("A")).unwrap();
        let requests = transport.take_requests();
        transport.reply(requests[1].0, atom(70)).unwrap();

        let start = Instant::now();
        let reply = pipeline
            .collect_within(a, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply, atom(70));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(pipeline.is_pending(&b));

        transport.reply(requests[0].0, atom(69)).unwrap();
        assert_eq!(pipeline.collect(b).await, Ok(atom(69)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_collect_resolved_while_later_outstanding() {
        let (transport, pipeline) = loopback(ReplyOrdering::Fifo, PipelineConfig::default());

        let a = pipeline.submit(AtomRequest::intern("A")).unwrap();
        let b = pipeline.submit(AtomRequest::intern("B")).unwrap();
        let (seq, _) = transport.next_request().unwrap();
        transport.reply(seq, atom(69)).unwrap();

        let start = Instant::now();
        assert_eq!(pipeline.collect(a).await, Ok(atom(69)));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(pipeline.is_pending(&b));
    }

    #[tokio::test]
    async fn test_concurrent_waiters_wake_independently() {
        let (transport, pipeline) = loopback(ReplyOrdering::Tagged, PipelineConfig::default());
        let pipeline = Arc::new(pipeline);

        let first = pipeline.submit(AtomRequest::intern("A")).unwrap();
        let second = pipeline.submit(AtomRequest::intern("B")).unwrap();

        let waiter = |token: Token| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.collect(token).await })
        };
        let first_waiter = waiter(first);
        let second_waiter = waiter(second);
        tokio::task::yield_now().await;

        transport.reply(pipeline_core::SequenceId(2), atom(70)).unwrap();
        assert_eq!(second_waiter.await.unwrap(), Ok(atom(70)));
        assert!(!first_waiter.is_finished());

        transport.reply(pipeline_core::SequenceId(1), atom(69)).unwrap();
        assert_eq!(first_waiter.await.unwrap(), Ok(atom(69)));
    }

    // =============================================================================
    // 5. ROUND-TRIP AMPLIFICATION
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_pipelined_drain_pays_latency_once() {
        let pipeline = simulated(LatencyModel::Fixed(LATENCY), ReplyOrdering::Fifo);
        let names = pipeline_core::numbered_names(500);

        let start = Instant::now();
        for name in &names {
            pipeline.submit(AtomRequest::intern(name.as_str())).unwrap();
        }
        let drained = pipeline.drain().await;
        let drain_time = start.elapsed();

        assert_eq!(drained.len(), 500);
        assert!(drain_time < LATENCY * 2, "drain took {:?}", drain_time);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interleaved_pays_latency_per_request() {
        let pipeline = simulated(LatencyModel::Fixed(LATENCY), ReplyOrdering::Fifo);
        let names = pipeline_core::numbered_names(500);

        let start = Instant::now();
        for name in &names {
            let token = pipeline.submit(AtomRequest::intern(name.as_str())).unwrap();
            pipeline.collect(token).await.unwrap();
        }
        let interleaved_time = start.elapsed();

        let floor = LATENCY.mul_f64(0.9 * 500.0);
        assert!(
            interleaved_time >= floor,
            "interleaved took {:?}, expected at least {:?}",
            interleaved_time,
            floor
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bench_harness_reproduces_amplification() {
        let config = pipeline_bench::BenchConfig {
            requests: 500,
            ..pipeline_bench::BenchConfig::default()
        };
        let report = pipeline_bench::run_benchmark(&config).await.unwrap();

        assert!(report.pipelined.elapsed() < LATENCY * 2);
        assert!(report.batched.elapsed() < LATENCY * 2);
        assert!(report.naive.elapsed() >= LATENCY.mul_f64(450.0));
    }

    // =============================================================================
    // 6. BACKPRESSURE
    // =============================================================================

    #[tokio::test]
    async fn test_cap_rejects_without_allocating_token() {
        let cap = 16;
        let (transport, pipeline) = loopback(
            ReplyOrdering::Fifo,
            PipelineConfig::default().with_max_outstanding(cap),
        );

        let tokens: Vec<Token> = (0..cap)
            .map(|i| pipeline.submit(AtomRequest::intern(format!("N{}", i))).unwrap())
            .collect();

        let err = pipeline.submit(AtomRequest::intern("OVER")).unwrap_err();
        assert_eq!(err, PipelineError::TooManyOutstanding { limit: cap });
        assert!(err.is_retryable());
        assert_eq!(transport.parked(), cap);
        assert_eq!(pipeline.pending_count(), cap);

        // Collect one, then the next submit gets the very next ordinal
        let (seq, _) = transport.next_request().unwrap();
        transport.reply(seq, atom(69)).unwrap();
        pipeline.collect(tokens[0]).await.unwrap();

        let next = pipeline.submit(AtomRequest::intern("OVER")).unwrap();
        assert_eq!(next.sequence(), tokens[cap - 1].sequence() + 1);
    }

    #[tokio::test]
    async fn test_resolved_but_uncollected_entries_count_against_cap() {
        let (transport, pipeline) = loopback(
            ReplyOrdering::Fifo,
            PipelineConfig::default().with_max_outstanding(1),
        );
        pipeline.submit(AtomRequest::intern("A")).unwrap();
        transport.reply(pipeline_core::SequenceId(1), atom(69)).unwrap();

        // Wait until the resolution loop has settled the entry
        while pipeline.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            pipeline.submit(AtomRequest::intern("B")),
            Err(PipelineError::TooManyOutstanding { limit: 1 })
        ));
    }

    // =============================================================================
    // 7. CANCELLING SHUTDOWN
    // =============================================================================

    #[tokio::test]
    async fn test_cancel_shutdown_fails_all_waiters() {
        const K: usize = 8;
        let (_transport, pipeline) = loopback(ReplyOrdering::Fifo, PipelineConfig::default());
        let pipeline = Arc::new(pipeline);

        let tokens: Vec<Token> = (0..K)
            .map(|i| pipeline.submit(AtomRequest::intern(format!("N{}", i))).unwrap())
            .collect();
        let waiters: Vec<_> = tokens
            .iter()
            .map(|&token| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { (token, pipeline.collect(token).await) })
            })
            .collect();
        tokio::task::yield_now().await;

        let report = pipeline.shutdown(ShutdownPolicy::Cancel).await;
        assert_eq!(report.cancelled, tokens);
        assert!(report.flushed.is_empty());
        assert_eq!(pipeline.pending_count(), 0);

        for waiter in waiters {
            let (token, result) = waiter.await.unwrap();
            assert_eq!(result, Err(PipelineError::Cancelled(token)));
        }
        assert_eq!(pipeline.stats_snapshot().cancelled, K as u64);
    }

    #[tokio::test]
    async fn test_cancelled_token_reports_once_then_unknown() {
        let (_transport, pipeline) = loopback(ReplyOrdering::Fifo, PipelineConfig::default());
        let token = pipeline.submit(AtomRequest::intern("A")).unwrap();

        pipeline.shutdown(ShutdownPolicy::Cancel).await;

        assert_eq!(
            pipeline.collect(token).await,
            Err(PipelineError::Cancelled(token))
        );
        assert_eq!(
            pipeline.collect(token).await,
            Err(PipelineError::UnknownToken(token))
        );
    }
}
