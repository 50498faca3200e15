//! End-to-end pipeline tests over the in-memory bus
//!
//! Wires the real publisher, ingest stage, and graph stage together and
//! drives them only through topic payloads - the same surface separate
//! processes would use against a broker.

#[cfg(test)]
mod pipeline_roundtrip_tests {
    use invoiceflow::bus::{InMemoryBus, MessageBus};
    use invoiceflow::pipeline::{
        ConflictPolicy, FileFormat, FileTask, GraphStage, HtmlChartRenderer, IngestStage,
        InvoiceStore, NullRenderer, TaskPublisher,
    };
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    // Four invoices in 2009-01 from four distinct customers; totals sum to
    // the worked-example figure 8198.79
    const JSON_FIXTURE: &str = r#"[
        {"InvoiceId": 1, "CustomerId": 2, "InvoiceDate": "2009-01-01 00:00:00",
         "BillingAddress": "Theodor-Heuss-Strasse 34", "BillingCity": "Stuttgart",
         "BillingState": null, "BillingCountry": "Germany",
         "BillingPostalCode": "70174", "Total": 1709.43},
        {"InvoiceId": 2, "CustomerId": 4, "InvoiceDate": "2009-01-02 00:00:00",
         "BillingAddress": "Ullevalsveien 14", "BillingCity": "Oslo",
         "BillingState": null, "BillingCountry": "Norway",
         "BillingPostalCode": "0171", "Total": 2324.25},
        {"InvoiceId": 3, "CustomerId": 8, "InvoiceDate": "2009-01-03 00:00:00",
         "BillingAddress": "Gretrystraat 63", "BillingCity": "Brussels",
         "BillingState": null, "BillingCountry": "Belgium",
         "BillingPostalCode": "1000", "Total": 1863.52},
        {"InvoiceId": 4, "CustomerId": 14, "InvoiceDate": "2009-01-06 00:00:00",
         "BillingAddress": "8210 111 ST NW", "BillingCity": "Edmonton",
         "BillingState": "AB", "BillingCountry": "Canada",
         "BillingPostalCode": "T6G 2C7", "Total": 2301.59}
    ]"#;

    // Four more invoices, 2009-02, fresh uniqueness keys
    const CSV_FIXTURE: &str = "\
InvoiceId,CustomerId,InvoiceDate,BillingAddress,BillingCity,BillingState,BillingCountry,BillingPostalCode,Total
5,2,2009-02-01 00:00:00,Theodor-Heuss-Strasse 34,Stuttgart,,Germany,70174,100.00
6,4,2009-02-03 00:00:00,Ullevalsveien 14,Oslo,,Norway,0171,50.50
7,23,2009-02-06 00:00:00,69 Salem Street,Boston,MA,USA,2113,25.25
8,37,2009-02-09 00:00:00,Berger Strasse 10,Frankfurt,,Germany,60316,10.00
";

    struct Harness {
        dir: TempDir,
        bus: Arc<dyn MessageBus>,
        store: InvoiceStore,
        renderer: Arc<NullRenderer>,
        publisher: TaskPublisher,
    }

    impl Harness {
        async fn start() -> Self {
            let dir = TempDir::new().unwrap();
            let db_path = dir.path().join("invoices.db");

            let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new(64));
            let renderer = Arc::new(NullRenderer::new());

            let graph = GraphStage::new(
                bus.clone(),
                InvoiceStore::new(&db_path, ConflictPolicy::Ignore).unwrap(),
                renderer.clone(),
                "database_to_graph",
            );
            tokio::spawn(graph.run());

            let ingest = IngestStage::new(
                bus.clone(),
                InvoiceStore::new(&db_path, ConflictPolicy::Ignore).unwrap(),
                "files_to_database",
                "database_to_graph",
            );
            tokio::spawn(ingest.run());

            let publisher = TaskPublisher::new(bus.clone(), "files_to_database");
            publisher.declare().await.unwrap();

            Self {
                store: InvoiceStore::new(&db_path, ConflictPolicy::Ignore).unwrap(),
                dir,
                bus,
                renderer,
                publisher,
            }
        }

        fn fixture(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(content.as_bytes()).unwrap();
            path
        }

        async fn wait_for_renders(&self, n: usize) {
            for _ in 0..100 {
                if self.renderer.calls().len() >= n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!(
                "expected {} render calls, saw {}",
                n,
                self.renderer.calls().len()
            );
        }
    }

    #[tokio::test]
    async fn test_json_and_csv_round_trip_into_one_table() {
        let h = Harness::start().await;
        let json_path = h.fixture("invoices_2009.json", JSON_FIXTURE);
        let csv_path = h.fixture("invoices_2009b.csv", CSV_FIXTURE);

        h.publisher
            .publish(&FileTask::new(
                json_path.to_str().unwrap(),
                FileFormat::Json,
                "invoices",
            ))
            .await
            .unwrap();
        h.publisher
            .publish(&FileTask::new(
                csv_path.to_str().unwrap(),
                FileFormat::Csv,
                "invoices",
            ))
            .await
            .unwrap();

        // One render per ingested file; the second sees both months
        h.wait_for_renders(2).await;

        assert_eq!(h.store.count("invoices").unwrap(), 8);

        let calls = h.renderer.calls();
        let series = &calls[1].1;
        assert_eq!(calls[1].0, "invoices");
        assert_eq!(series.len(), 2);

        assert_eq!(series[0].period, "2009-01");
        assert_eq!(series[0].distinct_customers, 4);
        assert!((series[0].total_amount - 8198.79).abs() < 1e-6);

        assert_eq!(series[1].period, "2009-02");
        assert_eq!(series[1].distinct_customers, 4);
        assert!((series[1].total_amount - 185.75).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_format_equivalence_across_tables() {
        // The same four logical rows through both codecs end up as the same
        // row set, modulo source column ordering
        let h = Harness::start().await;

        let json_rows: Vec<invoiceflow::pipeline::InvoiceRow> =
            serde_json::from_str(JSON_FIXTURE).unwrap();
        let mut csv_content = String::from(
            "InvoiceId,CustomerId,InvoiceDate,BillingAddress,BillingCity,BillingState,BillingCountry,BillingPostalCode,Total\n",
        );
        for row in &json_rows {
            csv_content.push_str(&format!(
                "{},{},{},\"{}\",{},{},{},{},{}\n",
                row.invoice_id,
                row.customer_id,
                row.invoice_date,
                row.billing_address.as_deref().unwrap_or(""),
                row.billing_city.as_deref().unwrap_or(""),
                row.billing_state.as_deref().unwrap_or(""),
                row.billing_country.as_deref().unwrap_or(""),
                row.billing_postal_code.as_deref().unwrap_or(""),
                row.total,
            ));
        }

        let json_path = h.fixture("same.json", JSON_FIXTURE);
        let csv_path = h.fixture("same.csv", &csv_content);

        h.publisher
            .publish(&FileTask::new(
                json_path.to_str().unwrap(),
                FileFormat::Json,
                "from_json",
            ))
            .await
            .unwrap();
        h.publisher
            .publish(&FileTask::new(
                csv_path.to_str().unwrap(),
                FileFormat::Csv,
                "from_csv",
            ))
            .await
            .unwrap();

        h.wait_for_renders(2).await;

        let from_json = h.store.fetch_rows("from_json").unwrap();
        let from_csv = h.store.fetch_rows("from_csv").unwrap();
        assert_eq!(from_json.len(), 4);
        assert_eq!(from_json, from_csv);
    }

    #[tokio::test]
    async fn test_bad_task_between_good_ones_changes_nothing() {
        let h = Harness::start().await;
        let json_path = h.fixture("invoices_2009.json", JSON_FIXTURE);

        h.publisher
            .publish(&FileTask::new(
                json_path.to_str().unwrap(),
                FileFormat::Json,
                "invoices",
            ))
            .await
            .unwrap();
        h.wait_for_renders(1).await;
        assert_eq!(h.store.count("invoices").unwrap(), 4);

        // Declared CSV over JSON content: parse failure, dropped in-stage
        h.publisher
            .publish(&FileTask::new(
                json_path.to_str().unwrap(),
                FileFormat::Csv,
                "invoices",
            ))
            .await
            .unwrap();
        // Raw garbage straight onto the topic: decode failure
        h.bus
            .publish("files_to_database", b"not a task".to_vec())
            .await
            .unwrap();

        // Re-publish the good task to prove the stage is still alive
        h.publisher
            .publish(&FileTask::new(
                json_path.to_str().unwrap(),
                FileFormat::Json,
                "invoices",
            ))
            .await
            .unwrap();
        h.wait_for_renders(2).await;

        // Bad tasks produced no notice and no rows; the re-ingest was
        // absorbed by the uniqueness key
        assert_eq!(h.renderer.calls().len(), 2);
        assert_eq!(h.store.count("invoices").unwrap(), 4);
    }

    #[tokio::test]
    async fn test_stages_started_after_publish_still_consume() {
        // Producer publishes into declared topics before either consumer
        // stage exists - startup order must not lose the first message
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("invoices.db");

        let json_path = dir.path().join("invoices.json");
        std::fs::write(&json_path, JSON_FIXTURE).unwrap();

        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new(64));
        let publisher = TaskPublisher::new(bus.clone(), "files_to_database");
        publisher.declare().await.unwrap();
        publisher
            .publish(&FileTask::new(
                json_path.to_str().unwrap(),
                FileFormat::Json,
                "invoices",
            ))
            .await
            .unwrap();

        let renderer = Arc::new(NullRenderer::new());
        let graph = GraphStage::new(
            bus.clone(),
            InvoiceStore::new(&db_path, ConflictPolicy::Ignore).unwrap(),
            renderer.clone(),
            "database_to_graph",
        );
        tokio::spawn(graph.run());

        let ingest = IngestStage::new(
            bus.clone(),
            InvoiceStore::new(&db_path, ConflictPolicy::Ignore).unwrap(),
            "files_to_database",
            "database_to_graph",
        );
        tokio::spawn(ingest.run());

        for _ in 0..100 {
            if renderer.calls().len() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let store = InvoiceStore::new(&db_path, ConflictPolicy::Ignore).unwrap();
        assert_eq!(store.count("invoices").unwrap(), 4);
        assert_eq!(renderer.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_chart_document_lands_on_disk() {
        // Same wiring with the real renderer: the output artifact exists
        // and carries both series
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("invoices.db");
        let chart_path = dir.path().join("out/figure.html");

        let json_path = dir.path().join("invoices.json");
        std::fs::write(&json_path, JSON_FIXTURE).unwrap();

        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new(64));
        let graph = GraphStage::new(
            bus.clone(),
            InvoiceStore::new(&db_path, ConflictPolicy::Ignore).unwrap(),
            Arc::new(HtmlChartRenderer::new(&chart_path)),
            "database_to_graph",
        );
        tokio::spawn(graph.run());

        let ingest = IngestStage::new(
            bus.clone(),
            InvoiceStore::new(&db_path, ConflictPolicy::Ignore).unwrap(),
            "files_to_database",
            "database_to_graph",
        );
        tokio::spawn(ingest.run());

        let publisher = TaskPublisher::new(bus.clone(), "files_to_database");
        publisher.declare().await.unwrap();
        publisher
            .publish(&FileTask::new(
                json_path.to_str().unwrap(),
                FileFormat::Json,
                "invoices",
            ))
            .await
            .unwrap();

        for _ in 0..100 {
            if chart_path.is_file() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let html = std::fs::read_to_string(&chart_path).unwrap();
        assert!(html.contains("Totals per Month"));
        assert!(html.contains("2009-01"));
    }
}
