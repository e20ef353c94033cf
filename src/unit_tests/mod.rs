mod generated_data_tests;
