pub mod records {
    pub mod record;
}

pub mod pagination {
    pub mod batch;
    pub mod item_set;
}

pub mod execution {
    pub mod unit;
}

pub mod versioning {
    pub mod dataset;
}
