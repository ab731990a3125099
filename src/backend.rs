pub(crate) mod backend;
pub(crate) mod common_data_bus;
pub(crate) mod execution_unit;
pub(crate) mod register_alias_table;
pub(crate) mod reservation_station;
