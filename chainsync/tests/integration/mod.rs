mod executor_test;
mod indexer_test;
mod materializer_test;
