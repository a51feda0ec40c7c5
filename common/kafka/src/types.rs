use std::fmt;

use rdkafka::topic_partition_list::TopicPartitionListElem;
use rdkafka::TopicPartitionList;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition {
    topic: String,
    partition_number: i32,
}

impl Partition {
    pub fn new(topic: String, partition_number: i32) -> Self {
        Self {
            topic,
            partition_number,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition_number(&self) -> i32 {
        self.partition_number
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.topic, self.partition_number)
    }
}

impl From<TopicPartitionListElem<'_>> for Partition {
    fn from(elem: TopicPartitionListElem<'_>) -> Self {
        Self::new(elem.topic().to_string(), elem.partition())
    }
}

/// Collects the partitions of a list, dropping offsets and duplicates.
pub fn partitions_of(list: &TopicPartitionList) -> Vec<Partition> {
    let mut partitions: Vec<Partition> = list.elements().into_iter().map(Partition::from).collect();
    partitions.sort();
    partitions.dedup();
    partitions
}
