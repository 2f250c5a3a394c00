use super::check_data_dir;

#[test]
fn data_dir_prompt_validation() {
    assert!(check_data_dir("astra_data").is_ok());
    assert!(check_data_dir("exports/today").is_ok());
    assert!(check_data_dir("../elsewhere").is_err());
}
